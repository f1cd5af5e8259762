//! Client side of the external wallet authority.
//!
//! The authority owns wallet balances. The engine reads a [`WalletSnapshot`],
//! computes the new balance locally and writes the whole snapshot back. The
//! snapshot `version` is the optimistic-concurrency token: the authority must
//! refuse an update whose version is not the current one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod http;

pub use http::HttpWalletGateway;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub balance_minor: i64,
    pub version: u64,
}

impl WalletSnapshot {
    /// Copy of the snapshot with `delta_minor` added to the balance, or
    /// `None` when the balance would overflow. The version is kept, so the
    /// copy is a valid conditional update.
    #[must_use]
    pub fn checked_delta(&self, delta_minor: i64) -> Option<Self> {
        Some(Self {
            balance_minor: self.balance_minor.checked_add(delta_minor)?,
            ..self.clone()
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("wallet {0} not found")]
    NotFound(Uuid),
    #[error("wallet {0} version conflict")]
    VersionConflict(Uuid),
    #[error("wallet update rejected: {0}")]
    Rejected(String),
    #[error("wallet service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait WalletGateway: Send + Sync {
    async fn fetch(&self, wallet_id: Uuid) -> Result<WalletSnapshot, GatewayError>;

    /// Conditional write of `wallet`, accepted only when `wallet.version` is
    /// the authority's current version. Returns the stored snapshot.
    async fn apply(&self, wallet: &WalletSnapshot) -> Result<WalletSnapshot, GatewayError>;
}
