use std::fs::File;
use std::io::Error;
use std::path::Path;

/// Writes a requests CSV with the given `(from, to, amount, key)` rows.
pub fn write_requests_csv(
    path: &Path,
    rows: &[(&str, &str, &str, &str)],
) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["from", "to", "amount", "key"])?;
    for (from, to, amount, key) in rows {
        wtr.write_record([from, to, amount, key])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Generates `rows` transfers of 1.0 between distinct wallet pairs.
pub fn generate_requests_csv(path: &Path, rows: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["from", "to", "amount", "key"])?;
    for i in 1..=rows {
        let from = format!("wallet-{i}");
        let to = format!("wallet-{}", i + rows);
        let key = format!("key-{i}");
        wtr.write_record([from.as_str(), to.as_str(), "1.0", key.as_str()])?;
    }

    wtr.flush()?;
    Ok(())
}
