//! Transaction rows.
//!
//! A `Transaction` records one wallet effect: an expense, an income, or one of
//! the two legs of a fund transfer. The two legs of a transfer share a
//! `transfer_id` and are told apart by `transfer_leg`.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, PaginatorTrait, QueryFilter, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    unit_of_work::UnitOfWork,
    util::{parse_optional_uuid, parse_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferLeg {
    CashOut,
    CashIn,
}

impl TransferLeg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CashOut => "cash_out",
            Self::CashIn => "cash_in",
        }
    }
}

impl TryFrom<&str> for TransferLeg {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "cash_out" => Ok(Self::CashOut),
            "cash_in" => Ok(Self::CashIn),
            other => Err(EngineError::InvalidCategoryType(format!(
                "invalid transfer leg: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub category_id: Uuid,
    pub amount_minor: i64,
    pub transaction_date: DateTime<Utc>,
    pub description: String,
    pub transfer_leg: Option<TransferLeg>,
    pub transfer_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        wallet_id: Uuid,
        category_id: Uuid,
        amount_minor: i64,
        transaction_date: DateTime<Utc>,
        description: String,
    ) -> ResultEngine<Self> {
        if amount_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "amount_minor must be > 0".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            wallet_id,
            category_id,
            amount_minor,
            transaction_date,
            description,
            transfer_leg: None,
            transfer_id: None,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub(crate) fn leg_of(mut self, transfer_id: Uuid, leg: TransferLeg) -> Self {
        self.transfer_id = Some(transfer_id);
        self.transfer_leg = Some(leg);
        self
    }

    #[must_use]
    pub(crate) fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub wallet_id: String,
    pub category_id: String,
    pub amount_minor: i64,
    pub transaction_date: DateTimeUtc,
    pub description: String,
    pub transfer_leg: Option<String>,
    pub transfer_id: Option<String>,
    #[sea_orm(unique)]
    pub idempotency_key: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::categories::Entity",
        from = "Column::CategoryId",
        to = "super::categories::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Category,
    #[sea_orm(has_many = "super::attachments::Entity")]
    Attachments,
}

impl Related<super::categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::attachments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attachments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            wallet_id: ActiveValue::Set(tx.wallet_id.to_string()),
            category_id: ActiveValue::Set(tx.category_id.to_string()),
            amount_minor: ActiveValue::Set(tx.amount_minor),
            transaction_date: ActiveValue::Set(tx.transaction_date),
            description: ActiveValue::Set(tx.description.clone()),
            transfer_leg: ActiveValue::Set(tx.transfer_leg.map(|leg| leg.as_str().to_string())),
            transfer_id: ActiveValue::Set(tx.transfer_id.map(|id| id.to_string())),
            idempotency_key: ActiveValue::Set(tx.idempotency_key.clone()),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            wallet_id: parse_uuid(&model.wallet_id, "wallet")?,
            category_id: parse_uuid(&model.category_id, "category")?,
            amount_minor: model.amount_minor,
            transaction_date: model.transaction_date,
            description: model.description,
            transfer_leg: model
                .transfer_leg
                .as_deref()
                .map(TransferLeg::try_from)
                .transpose()?,
            transfer_id: parse_optional_uuid(model.transfer_id.as_deref(), "transfer")?,
            idempotency_key: model.idempotency_key,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

pub(crate) async fn find<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> ResultEngine<Option<Transaction>> {
    Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(Transaction::try_from)
        .transpose()
}

pub(crate) async fn require<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEngine<Transaction> {
    find(db, id)
        .await?
        .ok_or(EngineError::TransactionNotFound(id))
}

pub(crate) async fn find_by_idempotency_key<C: ConnectionTrait>(
    db: &C,
    key: &str,
) -> ResultEngine<Option<Transaction>> {
    Entity::find()
        .filter(Column::IdempotencyKey.eq(key))
        .one(db)
        .await?
        .map(Transaction::try_from)
        .transpose()
}

pub(crate) async fn transfer_legs<C: ConnectionTrait>(
    db: &C,
    transfer_id: Uuid,
) -> ResultEngine<Vec<Transaction>> {
    Entity::find()
        .filter(Column::TransferId.eq(transfer_id.to_string()))
        .all(db)
        .await?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
}

pub(crate) async fn count_for_category<C: ConnectionTrait>(
    db: &C,
    category_id: Uuid,
) -> ResultEngine<u64> {
    Ok(Entity::find()
        .filter(Column::CategoryId.eq(category_id.to_string()))
        .count(db)
        .await?)
}

pub(crate) async fn insert(unit: &UnitOfWork, tx: &Transaction) -> ResultEngine<()> {
    ActiveModel::from(tx).insert(unit.connection()).await?;
    Ok(())
}

pub(crate) async fn update(unit: &UnitOfWork, tx: &Transaction) -> ResultEngine<()> {
    ActiveModel::from(tx).update(unit.connection()).await?;
    Ok(())
}

pub(crate) async fn delete(unit: &UnitOfWork, id: Uuid) -> ResultEngine<()> {
    Entity::delete_by_id(id.to_string())
        .exec(unit.connection())
        .await?;
    Ok(())
}
