//! Wallet side of a ledger write.
//!
//! A [`Saga`] wraps the wallet gateway for the duration of one operation and
//! keeps the compensation log: every wallet mutation the authority accepted.
//! Once that log is non-empty, a failure can no longer be undone by rolling
//! back the local unit of work. [`Saga::abort`] and [`Saga::commit`] turn such
//! failures into [`EngineError::PartialCommitHazard`], log them at error level
//! and persist them to the hazard log.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    gateway::{GatewayError, WalletGateway, WalletSnapshot},
    hazards,
    unit_of_work::UnitOfWork,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaOperation {
    CreateTransaction,
    FundTransfer,
    UpdateTransaction,
    DeleteTransaction,
}

impl SagaOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateTransaction => "create_transaction",
            Self::FundTransfer => "fund_transfer",
            Self::UpdateTransaction => "update_transaction",
            Self::DeleteTransaction => "delete_transaction",
        }
    }
}

impl TryFrom<&str> for SagaOperation {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "create_transaction" => Ok(Self::CreateTransaction),
            "fund_transfer" => Ok(Self::FundTransfer),
            "update_transaction" => Ok(Self::UpdateTransaction),
            "delete_transaction" => Ok(Self::DeleteTransaction),
            other => Err(EngineError::InvalidId(format!("unknown operation: {other}"))),
        }
    }
}

/// One wallet write the authority accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletMutation {
    pub wallet_id: Uuid,
    pub previous_balance_minor: i64,
    pub new_balance_minor: i64,
    /// Version the authority reported after the write.
    pub version: u64,
}

impl WalletMutation {
    /// Delta a reconciler has to apply to undo this mutation.
    pub fn compensation_minor(&self) -> i64 {
        self.previous_balance_minor - self.new_balance_minor
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HazardCause {
    /// A later wallet call of the same operation failed.
    WalletCallFailed(String),
    /// A local write inside the unit of work failed.
    LocalWriteFailed(String),
    /// The unit of work itself failed to commit.
    CommitFailed(String),
    /// The operation was dropped before it settled.
    Cancelled,
}

impl fmt::Display for HazardCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WalletCallFailed(reason) => write!(f, "wallet call failed: {reason}"),
            Self::LocalWriteFailed(reason) => write!(f, "local write failed: {reason}"),
            Self::CommitFailed(reason) => write!(f, "commit failed: {reason}"),
            Self::Cancelled => f.write_str("operation cancelled"),
        }
    }
}

/// Everything a reconciler needs to repair a partial commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardReport {
    pub id: Uuid,
    pub operation: SagaOperation,
    pub aggregate_id: Option<Uuid>,
    pub mutations: Vec<WalletMutation>,
    pub cause: HazardCause,
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for HazardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mutated {} wallet(s), {}",
            self.operation.as_str(),
            self.mutations.len(),
            self.cause
        )
    }
}

pub(crate) struct Saga<'a> {
    operation: SagaOperation,
    gateway: &'a dyn WalletGateway,
    database: DatabaseConnection,
    call_timeout: Duration,
    aggregate_id: Option<Uuid>,
    mutations: Vec<WalletMutation>,
    settled: bool,
}

impl<'a> Saga<'a> {
    pub(crate) fn new(
        operation: SagaOperation,
        gateway: &'a dyn WalletGateway,
        database: DatabaseConnection,
        call_timeout: Duration,
    ) -> Self {
        Self {
            operation,
            gateway,
            database,
            call_timeout,
            aggregate_id: None,
            mutations: Vec::new(),
            settled: false,
        }
    }

    pub(crate) fn set_aggregate(&mut self, aggregate_id: Uuid) {
        self.aggregate_id = Some(aggregate_id);
    }

    pub(crate) async fn fetch(&self, wallet_id: Uuid) -> ResultEngine<WalletSnapshot> {
        match timeout(self.call_timeout, self.gateway.fetch(wallet_id)).await {
            Ok(Ok(wallet)) => Ok(wallet),
            Ok(Err(err)) => Err(gateway_error(wallet_id, err)),
            Err(_) => Err(EngineError::WalletUnavailable(format!(
                "fetch of wallet {wallet_id} timed out"
            ))),
        }
    }

    /// Write `current` plus `delta_minor` back to the authority and record the
    /// mutation. A timeout counts as a rejection.
    pub(crate) async fn apply(
        &mut self,
        current: &WalletSnapshot,
        delta_minor: i64,
    ) -> ResultEngine<WalletSnapshot> {
        let next = current.checked_delta(delta_minor).ok_or_else(|| {
            EngineError::InvalidAmount(format!(
                "balance of wallet {} would overflow",
                current.id
            ))
        })?;
        match timeout(self.call_timeout, self.gateway.apply(&next)).await {
            Ok(Ok(applied)) => {
                tracing::debug!(
                    operation = self.operation.as_str(),
                    wallet_id = %current.id,
                    delta_minor,
                    "wallet mutation applied"
                );
                self.mutations.push(WalletMutation {
                    wallet_id: current.id,
                    previous_balance_minor: current.balance_minor,
                    new_balance_minor: applied.balance_minor,
                    version: applied.version,
                });
                Ok(applied)
            }
            Ok(Err(err)) => Err(gateway_error(current.id, err)),
            Err(_) => {
                tracing::warn!(
                    operation = self.operation.as_str(),
                    wallet_id = %current.id,
                    delta_minor,
                    "wallet apply timed out, outcome unknown to the authority"
                );
                Err(EngineError::WalletUnavailable(format!(
                    "apply on wallet {} timed out",
                    current.id
                )))
            }
        }
    }

    /// Commit the unit. Fails with a hazard if wallets were already mutated.
    pub(crate) async fn commit(mut self, unit: UnitOfWork) -> ResultEngine<()> {
        let result = unit.commit().await;
        self.settled = true;
        match result {
            Ok(()) => Ok(()),
            Err(err) if self.mutations.is_empty() => Err(err.into()),
            Err(err) => Err(self.hazard(HazardCause::CommitFailed(err.to_string())).await),
        }
    }

    /// Roll the unit back and classify `err`.
    pub(crate) async fn abort(mut self, unit: UnitOfWork, err: EngineError) -> EngineError {
        unit.rollback().await;
        self.settled = true;
        if self.mutations.is_empty() {
            return err;
        }
        let cause = if err.is_wallet_call() {
            HazardCause::WalletCallFailed(err.to_string())
        } else {
            HazardCause::LocalWriteFailed(err.to_string())
        };
        self.hazard(cause).await
    }

    fn report(&self, cause: HazardCause) -> HazardReport {
        HazardReport {
            id: Uuid::new_v4(),
            operation: self.operation,
            aggregate_id: self.aggregate_id,
            mutations: self.mutations.clone(),
            cause,
            detected_at: Utc::now(),
        }
    }

    async fn hazard(&self, cause: HazardCause) -> EngineError {
        let report = self.report(cause);
        log_hazard(&report);
        hazards::record(&self.database, &report).await;
        EngineError::PartialCommitHazard(Box::new(report))
    }
}

impl Drop for Saga<'_> {
    fn drop(&mut self) {
        if self.settled || self.mutations.is_empty() {
            return;
        }
        let report = self.report(HazardCause::Cancelled);
        log_hazard(&report);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let database = self.database.clone();
            handle.spawn(async move { hazards::record(&database, &report).await });
        }
    }
}

fn log_hazard(report: &HazardReport) {
    tracing::error!(
        hazard_id = %report.id,
        operation = report.operation.as_str(),
        aggregate_id = ?report.aggregate_id,
        mutations = ?report.mutations,
        cause = %report.cause,
        "partial commit hazard: wallet mutated but ledger not committed"
    );
}

fn gateway_error(wallet_id: Uuid, err: GatewayError) -> EngineError {
    match err {
        GatewayError::NotFound(id) => EngineError::WalletNotFound(id),
        GatewayError::VersionConflict(id) => EngineError::WalletConflict(id),
        GatewayError::Rejected(reason) => EngineError::WalletRejected { wallet_id, reason },
        GatewayError::Unavailable(reason) => EngineError::WalletUnavailable(reason),
    }
}
