//! Transactional outbox.
//!
//! Every committed ledger write stages one row here inside the same unit of
//! work as the business rows. The [`OutboxPublisher`](crate::OutboxPublisher)
//! relays pending rows to the broker afterwards.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, QueryFilter, QueryOrder, QuerySelect, entity::prelude::*, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, unit_of_work::UnitOfWork, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "transaction.created")]
    TransactionCreated,
    #[serde(rename = "transaction.updated")]
    TransactionUpdated,
    #[serde(rename = "transaction.deleted")]
    TransactionDeleted,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransactionCreated => "transaction.created",
            Self::TransactionUpdated => "transaction.updated",
            Self::TransactionDeleted => "transaction.deleted",
        }
    }
}

impl TryFrom<&str> for EventType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "transaction.created" => Ok(Self::TransactionCreated),
            "transaction.updated" => Ok(Self::TransactionUpdated),
            "transaction.deleted" => Ok(Self::TransactionDeleted),
            other => Err(EngineError::InvalidId(format!("unknown event type: {other}"))),
        }
    }
}

/// A staged event as the publisher sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: EventType,
    /// JSON snapshot of the aggregate.
    pub payload: Vec<u8>,
    pub published: bool,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub published: bool,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
    pub published_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for OutboxMessage {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "outbox message")?,
            aggregate_id: parse_uuid(&model.aggregate_id, "aggregate")?,
            event_type: EventType::try_from(model.event_type.as_str())?,
            payload: model.payload,
            published: model.published,
            retry_count: model.retry_count,
            max_retries: model.max_retries,
            last_error: model.last_error,
            created_at: model.created_at,
            published_at: model.published_at,
        })
    }
}

/// Serialize `snapshot` and stage it in the unit.
pub(crate) async fn stage<T: Serialize>(
    unit: &UnitOfWork,
    aggregate_id: Uuid,
    event_type: EventType,
    snapshot: &T,
    max_retries: i32,
) -> ResultEngine<Uuid> {
    let id = Uuid::new_v4();
    let model = ActiveModel {
        id: ActiveValue::Set(id.to_string()),
        aggregate_id: ActiveValue::Set(aggregate_id.to_string()),
        event_type: ActiveValue::Set(event_type.as_str().to_string()),
        payload: ActiveValue::Set(serde_json::to_vec(snapshot)?),
        published: ActiveValue::Set(false),
        retry_count: ActiveValue::Set(0),
        max_retries: ActiveValue::Set(max_retries),
        last_error: ActiveValue::Set(None),
        created_at: ActiveValue::Set(Utc::now()),
        published_at: ActiveValue::Set(None),
    };
    model.insert(unit.connection()).await?;
    Ok(id)
}

/// Unpublished messages that still have retries left, oldest first.
pub(crate) async fn pending<C: ConnectionTrait>(
    db: &C,
    batch_size: u64,
) -> ResultEngine<Vec<OutboxMessage>> {
    Entity::find()
        .filter(Column::Published.eq(false))
        .filter(Expr::cust("retry_count < max_retries"))
        .order_by_asc(Column::CreatedAt)
        .limit(batch_size)
        .all(db)
        .await?
        .into_iter()
        .map(OutboxMessage::try_from)
        .collect()
}

pub(crate) async fn mark_published<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEngine<()> {
    let Some(model) = Entity::find_by_id(id.to_string()).one(db).await? else {
        return Ok(());
    };
    let mut active: ActiveModel = model.into();
    active.published = ActiveValue::Set(true);
    active.published_at = ActiveValue::Set(Some(Utc::now()));
    active.last_error = ActiveValue::Set(None);
    active.update(db).await?;
    Ok(())
}

/// Record a failed publish attempt and return the new retry count.
pub(crate) async fn record_failure<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    error: &str,
) -> ResultEngine<i32> {
    let Some(model) = Entity::find_by_id(id.to_string()).one(db).await? else {
        return Ok(0);
    };
    let retry_count = model.retry_count + 1;
    let mut active: ActiveModel = model.into();
    active.retry_count = ActiveValue::Set(retry_count);
    active.last_error = ActiveValue::Set(Some(error.to_string()));
    active.update(db).await?;
    Ok(retry_count)
}

/// Delete published messages older than `before`.
pub(crate) async fn purge_published<C: ConnectionTrait>(
    db: &C,
    before: DateTime<Utc>,
) -> ResultEngine<u64> {
    let result = Entity::delete_many()
        .filter(Column::Published.eq(true))
        .filter(Column::PublishedAt.lt(before))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
