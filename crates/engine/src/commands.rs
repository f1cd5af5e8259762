//! Command structs for engine operations.
//!
//! These types group parameters for write operations
//! (create/transfer/update, categories), keeping call sites readable and
//! avoiding long argument lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CategoryType, EngineError, ResultEngine};

/// Base64 files uploaded together.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentGroup {
    pub files: Vec<String>,
}

impl AttachmentGroup {
    #[must_use]
    pub fn new(files: Vec<String>) -> Self {
        Self { files }
    }
}

/// Attachment change requested by an update. `status` is `"create"` with
/// base64 payloads in `files`, or `"delete"` with attachment ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentOp {
    pub status: String,
    pub files: Vec<String>,
}

impl AttachmentOp {
    #[must_use]
    pub fn create(files: Vec<String>) -> Self {
        Self {
            status: "create".to_string(),
            files,
        }
    }

    #[must_use]
    pub fn delete(ids: &[Uuid]) -> Self {
        Self {
            status: "delete".to_string(),
            files: ids.iter().map(ToString::to_string).collect(),
        }
    }
}

/// An [`AttachmentOp`] whose tag and ids have been checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ParsedAttachmentOp {
    Create(Vec<String>),
    Delete(Vec<Uuid>),
}

impl TryFrom<&AttachmentOp> for ParsedAttachmentOp {
    type Error = EngineError;

    fn try_from(op: &AttachmentOp) -> ResultEngine<Self> {
        if op.files.is_empty() {
            return Err(EngineError::InvalidAttachmentOperation(format!(
                "{} operation without files",
                op.status
            )));
        }
        match op.status.as_str() {
            "create" => Ok(Self::Create(op.files.clone())),
            "delete" => op
                .files
                .iter()
                .map(|raw| {
                    Uuid::parse_str(raw).map_err(|_| {
                        EngineError::InvalidAttachmentOperation(format!(
                            "invalid attachment id: {raw}"
                        ))
                    })
                })
                .collect::<ResultEngine<Vec<_>>>()
                .map(Self::Delete),
            other => Err(EngineError::InvalidAttachmentOperation(format!(
                "unknown attachment operation: {other}"
            ))),
        }
    }
}

/// Record an expense or an income against one wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransactionCmd {
    pub wallet_id: Uuid,
    pub category_id: Uuid,
    pub amount_minor: i64,
    pub transaction_date: DateTime<Utc>,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
    pub attachments: Vec<AttachmentGroup>,
}

impl CreateTransactionCmd {
    #[must_use]
    pub fn new(
        wallet_id: Uuid,
        category_id: Uuid,
        amount_minor: i64,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet_id,
            category_id,
            amount_minor,
            transaction_date,
            description: None,
            idempotency_key: None,
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn attachment(mut self, group: AttachmentGroup) -> Self {
        self.attachments.push(group);
        self
    }
}

/// Move money between two wallets. The source pays `amount_minor` plus
/// `admin_fee_minor`; the destination receives `amount_minor`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundTransferCmd {
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub amount_minor: i64,
    pub admin_fee_minor: i64,
    pub cash_out_category_id: Uuid,
    pub cash_in_category_id: Uuid,
    pub transaction_date: DateTime<Utc>,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

impl FundTransferCmd {
    #[must_use]
    pub fn new(
        from_wallet_id: Uuid,
        to_wallet_id: Uuid,
        amount_minor: i64,
        cash_out_category_id: Uuid,
        cash_in_category_id: Uuid,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            from_wallet_id,
            to_wallet_id,
            amount_minor,
            admin_fee_minor: 0,
            cash_out_category_id,
            cash_in_category_id,
            transaction_date,
            description: None,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn admin_fee(mut self, admin_fee_minor: i64) -> Self {
        self.admin_fee_minor = admin_fee_minor;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Dispatch for [`Engine::create`](crate::Engine::create).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateRequest {
    Single(CreateTransactionCmd),
    Transfer(FundTransferCmd),
}

/// Partial update of a transaction. Unset fields keep their stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTransactionCmd {
    pub wallet_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub amount_minor: Option<i64>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub attachments: Vec<AttachmentOp>,
}

impl UpdateTransactionCmd {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn wallet_id(mut self, wallet_id: Uuid) -> Self {
        self.wallet_id = Some(wallet_id);
        self
    }

    #[must_use]
    pub fn category_id(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    #[must_use]
    pub fn transaction_date(mut self, transaction_date: DateTime<Utc>) -> Self {
        self.transaction_date = Some(transaction_date);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn attachment(mut self, op: AttachmentOp) -> Self {
        self.attachments.push(op);
        self
    }
}

/// Create or rename a category.
///
/// A child category (with `parent_id`) always takes its parent's type, so
/// `kind` is only read for root categories.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCmd {
    pub name: String,
    pub kind: Option<CategoryType>,
    pub parent_id: Option<Uuid>,
}

impl CategoryCmd {
    #[must_use]
    pub fn root(name: impl Into<String>, kind: CategoryType) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind),
            parent_id: None,
        }
    }

    #[must_use]
    pub fn child(name: impl Into<String>, parent_id: Uuid) -> Self {
        Self {
            name: name.into(),
            kind: None,
            parent_id: Some(parent_id),
        }
    }
}
