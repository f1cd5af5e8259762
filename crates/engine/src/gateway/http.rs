use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GatewayError, WalletGateway, WalletSnapshot};

/// [`WalletGateway`] talking JSON over HTTP.
///
/// - `GET  {base}/wallets/{id}` returns a [`WalletSnapshot`]
/// - `PUT  {base}/wallets/{id}` takes the new state plus `expected_version`
///   and answers `409` when the version is stale
#[derive(Debug, Clone)]
pub struct HttpWalletGateway {
    base_url: Url,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct WalletUpdate<'a> {
    owner: &'a str,
    name: &'a str,
    balance_minor: i64,
    expected_version: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl HttpWalletGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|err| GatewayError::Unavailable(format!("invalid base_url: {err}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Unavailable(format!("http client: {err}")))?;
        Ok(Self { base_url, http })
    }

    fn endpoint(&self, wallet_id: Uuid) -> Result<Url, GatewayError> {
        self.base_url
            .join(&format!("wallets/{wallet_id}"))
            .map_err(|err| GatewayError::Unavailable(format!("invalid base_url: {err}")))
    }

    async fn into_snapshot(
        wallet_id: Uuid,
        res: reqwest::Response,
    ) -> Result<WalletSnapshot, GatewayError> {
        if res.status().is_success() {
            return res
                .json::<WalletSnapshot>()
                .await
                .map_err(|err| GatewayError::Unavailable(err.to_string()));
        }

        let status = res.status();
        let body = res
            .json::<ErrorResponse>()
            .await
            .map(|err| err.error)
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(status_error(wallet_id, status, body))
    }
}

fn status_error(wallet_id: Uuid, status: StatusCode, body: String) -> GatewayError {
    match status.as_u16() {
        404 => GatewayError::NotFound(wallet_id),
        409 | 412 => GatewayError::VersionConflict(wallet_id),
        400..=499 => GatewayError::Rejected(body),
        _ => GatewayError::Unavailable(format!("{status}: {body}")),
    }
}

#[async_trait]
impl WalletGateway for HttpWalletGateway {
    async fn fetch(&self, wallet_id: Uuid) -> Result<WalletSnapshot, GatewayError> {
        let res = self
            .http
            .get(self.endpoint(wallet_id)?)
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        Self::into_snapshot(wallet_id, res).await
    }

    async fn apply(&self, wallet: &WalletSnapshot) -> Result<WalletSnapshot, GatewayError> {
        let payload = WalletUpdate {
            owner: &wallet.owner,
            name: &wallet.name,
            balance_minor: wallet.balance_minor,
            expected_version: wallet.version,
        };
        let res = self
            .http
            .put(self.endpoint(wallet.id)?)
            .json(&payload)
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        Self::into_snapshot(wallet.id, res).await
    }
}
