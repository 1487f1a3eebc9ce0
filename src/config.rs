use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Marketplace knobs injected into the services. Values come from the
/// CLI in the replay binary and from test setups elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Fraction of the item subtotal charged as platform tax.
    pub tax_rate: Decimal,
    /// Flat delivery fee per order, split across sellers at payout time.
    pub shipping_cost: Decimal,
    /// Attempts per read-modify-write loop before giving up on a
    /// version conflict.
    pub commit_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.15),
            shipping_cost: Decimal::ZERO,
            commit_retries: 3,
        }
    }
}

impl Config {
    pub fn tax_for(&self, subtotal: Decimal) -> Decimal {
        (subtotal * self.tax_rate).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tax_rate() {
        let config = Config::default();
        assert_eq!(config.tax_for(dec!(500.0)), dec!(75.0));
    }

    #[test]
    fn test_tax_rounds_to_cents() {
        let config = Config::default();
        assert_eq!(config.tax_for(dec!(33.33)), dec!(5.00));
        assert_eq!(config.tax_for(dec!(10.10)), dec!(1.52));
    }
}
