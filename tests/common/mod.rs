use std::fs::File;
use std::io::Error;
use std::path::Path;

/// Generates a commands CSV of `rows` deposits spread over 50 users.
pub fn generate_commands_csv(path: &Path, rows: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["op", "actor", "order", "seller", "product", "amount", "quantity", "note"])?;

    for i in 0..rows {
        let actor = format!("user{}", i % 50);
        wtr.write_record(["deposit", &actor, "", "", "", "1.0", "", ""])?;
    }

    wtr.flush()?;
    Ok(())
}
