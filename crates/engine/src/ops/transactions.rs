//! Transaction sagas: create, fund transfer, update, delete, plus reads.
//!
//! Each write follows the same shape: open a unit, talk to the wallet
//! authority through a [`Saga`], write rows and the outbox message in the
//! unit, then let the saga commit or abort the unit.

use sea_orm::ConnectionTrait;
use tokio::time::timeout;
use uuid::Uuid;

use crate::{
    Attachment, CategoryType, EngineError, ResultEngine, TransactionView, TransferLeg,
    WalletSnapshot, attachments, categories,
    storage::{UploadRequest, inspect_payload},
    transactions::{self, Transaction},
    unit_of_work::UnitOfWork,
};

use super::Engine;

mod create;
mod delete;
mod list;
mod transfer;
mod update;

pub use list::TransactionListFilter;

/// Signed wallet effect of a row: negative debits the wallet.
///
/// Transfer legs carry their direction explicitly. Any other row takes it
/// from the category type.
pub(crate) fn wallet_effect(
    kind: CategoryType,
    leg: Option<TransferLeg>,
    amount_minor: i64,
) -> ResultEngine<i64> {
    match (leg, kind) {
        (Some(TransferLeg::CashOut), _) => Ok(-amount_minor),
        (Some(TransferLeg::CashIn), _) => Ok(amount_minor),
        (None, CategoryType::Expense) => Ok(-amount_minor),
        (None, CategoryType::Income) => Ok(amount_minor),
        (None, CategoryType::FundTransfer) => Err(EngineError::InvalidCategoryType(
            "fund_transfer categories are only valid on transfer legs".to_string(),
        )),
    }
}

/// Fails when the wallet balance plus `delta_minor` does not fit in `i64`.
pub(crate) fn ensure_fits(wallet: &WalletSnapshot, delta_minor: i64) -> ResultEngine<i64> {
    wallet.balance_minor.checked_add(delta_minor).ok_or_else(|| {
        EngineError::InvalidAmount(format!(
            "balance of wallet {} would overflow",
            wallet.id
        ))
    })
}

/// Fails when `delta_minor` would take the wallet below zero or overflow it.
pub(crate) fn ensure_covers(wallet: &WalletSnapshot, delta_minor: i64) -> ResultEngine<()> {
    let next_minor = ensure_fits(wallet, delta_minor)?;
    if delta_minor < 0 && next_minor < 0 {
        return Err(EngineError::InsufficientFunds(format!(
            "wallet {} holds {}, needs {}",
            wallet.id, wallet.balance_minor, -delta_minor
        )));
    }
    Ok(())
}

pub(crate) async fn load_view<C: ConnectionTrait>(
    db: &C,
    tx: &Transaction,
) -> ResultEngine<TransactionView> {
    let category = categories::require(db, tx.category_id).await?;
    let attachments = attachments::for_transaction(db, tx.id).await?;
    Ok(TransactionView::new(tx, &category, attachments))
}

impl Engine {
    /// Decode and check attachment payloads before any wallet call.
    fn check_payloads<'a>(&self, files: impl IntoIterator<Item = &'a String>) -> ResultEngine<()> {
        for file in files {
            inspect_payload(file, &self.settings.attachment_validation)?;
        }
        Ok(())
    }

    /// Upload `files` and insert one attachment row per file in the unit.
    async fn store_attachments(
        &self,
        unit: &UnitOfWork,
        transaction_id: Uuid,
        files: &[String],
    ) -> ResultEngine<Vec<Attachment>> {
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let request = UploadRequest {
                prefix: format!("{}_{transaction_id}", self.settings.attachment_prefix),
                base64_payload: file.clone(),
                bucket: self.settings.attachment_bucket.clone(),
                validation: self.settings.attachment_validation.clone(),
            };
            let object = timeout(self.settings.storage_timeout(), self.objects.upload(request))
                .await
                .map_err(|_| EngineError::Storage("attachment upload timed out".to_string()))??;
            let attachment = Attachment {
                id: Uuid::new_v4(),
                transaction_id,
                url: object.url,
                format: object.extension,
                size_bytes: object.size_bytes,
                created_at: chrono::Utc::now(),
            };
            attachments::insert(unit, &attachment).await?;
            stored.push(attachment);
        }
        Ok(stored)
    }

    /// Look up a previous write made with the same idempotency key.
    async fn replayed(&self, key: Option<&str>) -> ResultEngine<Option<Transaction>> {
        match key {
            Some(key) => transactions::find_by_idempotency_key(&self.database, key).await,
            None => Ok(None),
        }
    }
}
