use crate::domain::payment::PaymentRequest;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads payment requests from a CSV source.
///
/// Wraps `csv::Reader` and provides an iterator over `Result<PaymentRequest>`.
/// Whitespace is trimmed and malformed rows surface as per-row errors so a
/// bad line never aborts the stream.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    /// Creates a new `RequestReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    pub fn requests(self) -> impl Iterator<Item = Result<PaymentRequest>> {
        self.reader.into_deserialize().map(|row| {
            row.map_err(PaymentError::from)
                .and_then(|request: PaymentRequest| {
                    request.validate()?;
                    Ok(request)
                })
        })
    }
}
