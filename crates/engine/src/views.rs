//! Read models returned by the engine and serialized into outbox payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Attachment, Category, CategoryType, Transaction, TransferLeg};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentView {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub url: String,
    pub format: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Attachment> for AttachmentView {
    fn from(attachment: Attachment) -> Self {
        Self {
            id: attachment.id,
            transaction_id: attachment.transaction_id,
            url: attachment.url,
            format: attachment.format,
            size_bytes: attachment.size_bytes,
            created_at: attachment.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryView {
    pub id: Uuid,
    pub name: String,
    pub kind: CategoryType,
    pub parent_id: Option<Uuid>,
}

impl From<&Category> for CategoryView {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            kind: category.kind,
            parent_id: category.parent_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub category: CategoryView,
    pub amount_minor: i64,
    pub transaction_date: DateTime<Utc>,
    pub description: String,
    pub transfer_leg: Option<TransferLeg>,
    pub transfer_id: Option<Uuid>,
    pub attachments: Vec<AttachmentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionView {
    pub(crate) fn new(tx: &Transaction, category: &Category, attachments: Vec<Attachment>) -> Self {
        Self {
            id: tx.id,
            wallet_id: tx.wallet_id,
            category: CategoryView::from(category),
            amount_minor: tx.amount_minor,
            transaction_date: tx.transaction_date,
            description: tx.description.clone(),
            transfer_leg: tx.transfer_leg,
            transfer_id: tx.transfer_id,
            attachments: attachments.into_iter().map(AttachmentView::from).collect(),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundTransferView {
    pub transfer_id: Uuid,
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub amount_minor: i64,
    pub admin_fee_minor: i64,
    pub transaction_date: DateTime<Utc>,
    pub cash_out: TransactionView,
    pub cash_in: TransactionView,
}

impl FundTransferView {
    pub(crate) fn new(cash_out: TransactionView, cash_in: TransactionView) -> Self {
        Self {
            transfer_id: cash_out.transfer_id.unwrap_or(cash_out.id),
            from_wallet_id: cash_out.wallet_id,
            to_wallet_id: cash_in.wallet_id,
            amount_minor: cash_in.amount_minor,
            admin_fee_minor: cash_out.amount_minor - cash_in.amount_minor,
            transaction_date: cash_out.transaction_date,
            cash_out,
            cash_in,
        }
    }
}

/// Result of [`Engine::create`](crate::Engine::create).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateOutcome {
    Single(TransactionView),
    Transfer(FundTransferView),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub id: Uuid,
    pub name: String,
}

/// A root category and its children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub group_id: Uuid,
    pub group_name: String,
    pub kind: CategoryType,
    pub categories: Vec<CategoryEntry>,
}
