//! The module contains the errors the engine can throw.
//!
//! Every variant belongs to one [`ErrorClass`]. Callers route on the class:
//!
//! - [`NotFound`] and [`Validation`] are safe to report back to the requester.
//! - [`ExternalUnavailable`] happened before any wallet mutation, so the
//!   caller may retry.
//! - [`PartialCommitHazard`] means a wallet was mutated but the local ledger
//!   was not. It must go to reconciliation and must never be retried blindly.
//!
//!  [`NotFound`]: ErrorClass::NotFound
//!  [`Validation`]: ErrorClass::Validation
//!  [`ExternalUnavailable`]: ErrorClass::ExternalUnavailable
//!  [`PartialCommitHazard`]: ErrorClass::PartialCommitHazard
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::saga::HazardReport;

/// Coarse classification used by transports and reconciliation tooling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Validation,
    ExternalUnavailable,
    PartialCommitHazard,
    Internal,
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("wallet {0} not found")]
    WalletNotFound(Uuid),
    #[error("category {0} not found")]
    CategoryNotFound(Uuid),
    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),
    #[error("attachment {0} not found")]
    AttachmentNotFound(Uuid),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("source wallet and destination wallet cannot be the same")]
    SameWallet,
    #[error("Invalid category type: {0}")]
    InvalidCategoryType(String),
    #[error("Invalid attachment operation: {0}")]
    InvalidAttachmentOperation(String),
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("category {0} is still referenced by transactions")]
    CategoryInUse(Uuid),
    #[error("idempotency key {0} was used by a different operation")]
    IdempotencyConflict(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("wallet {0} was modified concurrently")]
    WalletConflict(Uuid),
    #[error("wallet {wallet_id} rejected the update: {reason}")]
    WalletRejected { wallet_id: Uuid, reason: String },
    #[error("wallet service unavailable: {0}")]
    WalletUnavailable(String),
    #[error("object storage error: {0}")]
    Storage(String),
    #[error("wallet applied but local commit failed: {0}")]
    PartialCommitHazard(Box<HazardReport>),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::WalletNotFound(_)
            | Self::CategoryNotFound(_)
            | Self::TransactionNotFound(_)
            | Self::AttachmentNotFound(_) => ErrorClass::NotFound,
            Self::InvalidAmount(_)
            | Self::InsufficientFunds(_)
            | Self::SameWallet
            | Self::InvalidCategoryType(_)
            | Self::InvalidAttachmentOperation(_)
            | Self::InvalidAttachment(_)
            | Self::InvalidName(_)
            | Self::CategoryInUse(_)
            | Self::IdempotencyConflict(_)
            | Self::InvalidCursor(_)
            | Self::InvalidRange(_)
            | Self::WalletRejected { .. } => ErrorClass::Validation,
            Self::WalletConflict(_) | Self::WalletUnavailable(_) | Self::Storage(_) => {
                ErrorClass::ExternalUnavailable
            }
            Self::PartialCommitHazard(_) => ErrorClass::PartialCommitHazard,
            Self::InvalidId(_)
            | Self::Configuration(_)
            | Self::Serialization(_)
            | Self::Database(_) => ErrorClass::Internal,
        }
    }

    /// Returns the hazard report when the error is a partial commit.
    pub fn hazard(&self) -> Option<&HazardReport> {
        match self {
            Self::PartialCommitHazard(report) => Some(report),
            _ => None,
        }
    }

    /// True for errors raised by the wallet authority itself.
    pub(crate) fn is_wallet_call(&self) -> bool {
        matches!(
            self,
            Self::WalletNotFound(_)
                | Self::WalletConflict(_)
                | Self::WalletRejected { .. }
                | Self::WalletUnavailable(_)
        )
    }
}
