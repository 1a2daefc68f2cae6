use thiserror::Error;

/// Failures raised by the fetch, normalize, aggregate and upload stages.
///
/// Engine functions return this type directly; the composition root wraps it
/// in `anyhow` with stage context.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transport error calling {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Invalid data in {table}: {message}")]
    DataShape { table: String, message: String },

    #[error("Numeric error in pool {pool} at {timestamp}: {message}")]
    Numeric {
        pool: String,
        timestamp: i64,
        message: String,
    },

    #[error("No USD price available for {symbol}")]
    MissingPrice { symbol: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sink error writing {table}: {message}")]
    Sink { table: String, message: String },
}

impl PipelineError {
    pub fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn data_shape(table: impl Into<String>, message: impl ToString) -> Self {
        Self::DataShape {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn sink(table: impl Into<String>, message: impl ToString) -> Self {
        Self::Sink {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Transport failures are the only class worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
