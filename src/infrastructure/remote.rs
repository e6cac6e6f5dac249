use crate::domain::payment::{Amount, TransferReceipt, TransferStatus};
use crate::domain::ports::LedgerBackend;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ledger backend speaking the remote settlement API.
///
/// Sandbox and production are the same protocol; they differ only in
/// endpoint, credentials and the network label stamped on receipts.
/// Transport failures and non-2xx responses surface as `BackendUnavailable`
/// so the circuit breaker and retry policy can classify them.
pub struct RemoteLedger {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    network: &'static str,
}

#[derive(Debug, Serialize)]
struct TransferBody<'a> {
    from: &'a str,
    to: &'a str,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    #[serde(rename = "txId")]
    tx_id: String,
    status: String,
}

impl RemoteLedger {
    pub fn new(network: &'static str, endpoint: String, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PaymentError::internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            network,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| PaymentError::backend_unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaymentError::backend_unavailable(format!(
                "{} returned {status}",
                self.network
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::backend_unavailable(format!("malformed response: {e}")))
    }
}

fn parse_status(raw: &str) -> Result<TransferStatus> {
    match raw {
        "confirmed" => Ok(TransferStatus::Confirmed),
        "pending" => Ok(TransferStatus::Pending),
        "failed" => Ok(TransferStatus::Failed),
        other => Err(PaymentError::backend_unavailable(format!(
            "unexpected transaction status `{other}`"
        ))),
    }
}

#[async_trait]
impl LedgerBackend for RemoteLedger {
    async fn get_balance(&self, wallet: &str) -> Result<Decimal> {
        let response: BalanceResponse = self
            .send(self.client.get(self.url(&format!("balance/{wallet}"))))
            .await?;
        Ok(response.balance)
    }

    async fn transfer(&self, from: &str, to: &str, amount: Amount) -> Result<TransferReceipt> {
        let body = TransferBody {
            from,
            to,
            amount: amount.value(),
        };
        let response: TransactionResponse = self
            .send(self.client.post(self.url("transactions")).json(&body))
            .await?;

        Ok(TransferReceipt {
            status: parse_status(&response.status)?,
            tx_id: response.tx_id,
            network: self.network.to_string(),
        })
    }

    async fn verify(&self, tx_id: &str) -> Result<TransferStatus> {
        let response: TransactionResponse = self
            .send(self.client.get(self.url(&format!("transactions/{tx_id}"))))
            .await?;
        parse_status(&response.status)
    }

    fn network(&self) -> &str {
        self.network
    }
}
