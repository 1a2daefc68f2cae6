use bigdecimal::{BigDecimal, FromPrimitive};

/// Pool TVL snapshots, daily pool metrics and health scores
pub mod pool_models;

/// Swap rollups by pool and by day
pub mod swap_models;

/// Store an `f64` metric as NUMERIC; non-finite values become zero.
pub fn to_decimal(value: f64) -> BigDecimal {
    BigDecimal::from_f64(value).unwrap_or_default()
}

pub fn to_decimal_opt(value: Option<f64>) -> Option<BigDecimal> {
    value.map(to_decimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_to_decimal() {
        assert_eq!(to_decimal(1.5), BigDecimal::from_str("1.5").unwrap());
        assert_eq!(to_decimal(f64::NAN), BigDecimal::default());
        assert_eq!(to_decimal_opt(None), None);
    }
}
