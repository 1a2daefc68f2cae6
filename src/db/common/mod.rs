/// Diesel insert models and metric conversions
pub mod models;
