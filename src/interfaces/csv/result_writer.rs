use crate::domain::payment::{PaymentRequest, SettlementResult};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One output row: the request echoed back with its settlement outcome.
#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    from: &'a str,
    to: &'a str,
    amount: String,
    success: bool,
    tx_id: &'a str,
    network: &'a str,
    error: &'a str,
}

/// Writes settlement results as CSV.
pub struct ResultWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_result(
        &mut self,
        request: &PaymentRequest,
        result: &SettlementResult,
    ) -> Result<()> {
        self.writer.serialize(ResultRow {
            from: &request.from,
            to: &request.to,
            amount: request.amount.value().to_string(),
            success: result.success,
            tx_id: result.transaction_id.as_deref().unwrap_or(""),
            network: result.network.as_deref().unwrap_or(""),
            error: result.error.as_deref().unwrap_or(""),
        })?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
