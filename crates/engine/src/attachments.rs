//! Attachment rows. Each attachment points at an uploaded object and belongs
//! to exactly one transaction.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, unit_of_work::UnitOfWork, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub url: String,
    pub format: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "attachments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub transaction_id: String,
    pub url: String,
    pub format: String,
    pub size_bytes: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transactions::Entity",
        from = "Column::TransactionId",
        to = "super::transactions::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Transaction,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Attachment> for ActiveModel {
    fn from(attachment: &Attachment) -> Self {
        Self {
            id: ActiveValue::Set(attachment.id.to_string()),
            transaction_id: ActiveValue::Set(attachment.transaction_id.to_string()),
            url: ActiveValue::Set(attachment.url.clone()),
            format: ActiveValue::Set(attachment.format.clone()),
            size_bytes: ActiveValue::Set(attachment.size_bytes),
            created_at: ActiveValue::Set(attachment.created_at),
        }
    }
}

impl TryFrom<Model> for Attachment {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "attachment")?,
            transaction_id: parse_uuid(&model.transaction_id, "transaction")?,
            url: model.url,
            format: model.format,
            size_bytes: model.size_bytes,
            created_at: model.created_at,
        })
    }
}

pub(crate) async fn find<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEngine<Option<Attachment>> {
    Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(Attachment::try_from)
        .transpose()
}

pub(crate) async fn for_transaction<C: ConnectionTrait>(
    db: &C,
    transaction_id: Uuid,
) -> ResultEngine<Vec<Attachment>> {
    Entity::find()
        .filter(Column::TransactionId.eq(transaction_id.to_string()))
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(Attachment::try_from)
        .collect()
}

pub(crate) async fn insert(unit: &UnitOfWork, attachment: &Attachment) -> ResultEngine<()> {
    ActiveModel::from(attachment)
        .insert(unit.connection())
        .await?;
    Ok(())
}

pub(crate) async fn delete(unit: &UnitOfWork, id: Uuid) -> ResultEngine<()> {
    Entity::delete_by_id(id.to_string())
        .exec(unit.connection())
        .await?;
    Ok(())
}

pub(crate) async fn delete_for_transaction(
    unit: &UnitOfWork,
    transaction_id: Uuid,
) -> ResultEngine<u64> {
    let result = Entity::delete_many()
        .filter(Column::TransactionId.eq(transaction_id.to_string()))
        .exec(unit.connection())
        .await?;
    Ok(result.rows_affected)
}
