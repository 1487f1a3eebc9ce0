use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One replayed marketplace command.
///
/// Which columns matter depends on `op`: a deposit uses `actor` and
/// `amount`, an item row stages a cart line, a seller row carries the new
/// status in `note`. Unused columns stay empty.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRow {
    pub op: OpKind,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub order: String,
    #[serde(default)]
    pub seller: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Deposit,
    Item,
    Place,
    Seller,
    Confirm,
    Deny,
    Cancel,
}

/// Reads commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record
/// lengths, yielding rows lazily so large replays stream.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<CommandRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(MarketError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "op,actor,order,seller,product,amount,quantity,note";

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{HEADER}\ndeposit, alice, , , , 100.0, ,\nitem, alice, o1, bob, keyboard, 300.0, 1,"
        );
        let rows: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();

        assert_eq!(rows.len(), 2);
        let deposit = rows[0].as_ref().unwrap();
        assert_eq!(deposit.op, OpKind::Deposit);
        assert_eq!(deposit.actor, "alice");
        assert_eq!(deposit.amount, Some(dec!(100.0)));

        let item = rows[1].as_ref().unwrap();
        assert_eq!(item.op, OpKind::Item);
        assert_eq!(item.seller, "bob");
        assert_eq!(item.quantity, Some(1));
    }

    #[test]
    fn test_reader_unknown_op_is_row_error() {
        let data = format!("{HEADER}\nexplode, alice, , , , , ,");
        let rows: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_err());
    }

    #[test]
    fn test_reader_note_with_comma_quoted() {
        let data = format!("{HEADER}\ncancel, alice, o1, , , , ,\"changed my mind, sorry\"");
        let rows: Vec<_> = CommandReader::new(data.as_bytes()).commands().collect();

        let cancel = rows[0].as_ref().unwrap();
        assert_eq!(cancel.note, "changed my mind, sorry");
    }
}
