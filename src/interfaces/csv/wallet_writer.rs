use crate::domain::wallet::Wallet;
use crate::error::Result;
use std::io::Write;

/// Writes the final wallet report as `user,balance` CSV rows.
pub struct WalletReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(mut self, wallets: &[Wallet]) -> Result<()> {
        self.writer.write_record(["user", "balance"])?;
        for wallet in wallets {
            // normalize so 425.00 and 425.0 both print as 425
            let balance = wallet.balance.value().normalize().to_string();
            self.writer
                .write_record([wallet.user_id.as_str(), &balance])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use rust_decimal_macros::dec;

    #[test]
    fn test_report_format() {
        let mut alice = Wallet::new("alice");
        alice.credit(Amount::new(dec!(42.5)).unwrap());
        let bob = Wallet::new("bob");

        let mut out = Vec::new();
        WalletReportWriter::new(&mut out)
            .write(&[alice, bob])
            .unwrap();

        let report = String::from_utf8(out).unwrap();
        assert_eq!(report, "user,balance\nalice,42.5\nbob,0\n");
    }

    #[test]
    fn test_report_normalizes_trailing_zeros() {
        let mut alice = Wallet::new("alice");
        alice.credit(Amount::new(dec!(425.00)).unwrap());

        let mut out = Vec::new();
        WalletReportWriter::new(&mut out).write(&[alice]).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "user,balance\nalice,425\n");
    }
}
