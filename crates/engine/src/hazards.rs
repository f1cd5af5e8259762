//! Hazard log.
//!
//! Partial commits are written here on the plain connection, after the unit
//! of work has been rolled back. The write is best effort: when it fails the
//! error-level log line emitted by the saga is the only trace left.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, DatabaseConnection, QueryFilter, QueryOrder, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    saga::{HazardCause, HazardReport, SagaOperation, WalletMutation},
    util::{parse_optional_uuid, parse_uuid},
};

/// A persisted [`HazardReport`] plus its resolution state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardRecord {
    pub report: HazardReport,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "saga_hazards")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub operation: String,
    pub aggregate_id: Option<String>,
    /// JSON array of wallet mutations.
    pub wallet_mutations: String,
    /// JSON encoded cause.
    pub cause: String,
    pub created_at: DateTimeUtc,
    pub resolved_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&HazardReport> for ActiveModel {
    type Error = EngineError;

    fn try_from(report: &HazardReport) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(report.id.to_string()),
            operation: ActiveValue::Set(report.operation.as_str().to_string()),
            aggregate_id: ActiveValue::Set(report.aggregate_id.map(|id| id.to_string())),
            wallet_mutations: ActiveValue::Set(serde_json::to_string(&report.mutations)?),
            cause: ActiveValue::Set(serde_json::to_string(&report.cause)?),
            created_at: ActiveValue::Set(report.detected_at),
            resolved_at: ActiveValue::Set(None),
        })
    }
}

impl TryFrom<Model> for HazardRecord {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let mutations: Vec<WalletMutation> = serde_json::from_str(&model.wallet_mutations)?;
        let cause: HazardCause = serde_json::from_str(&model.cause)?;
        Ok(Self {
            report: HazardReport {
                id: parse_uuid(&model.id, "hazard")?,
                operation: SagaOperation::try_from(model.operation.as_str())?,
                aggregate_id: parse_optional_uuid(model.aggregate_id.as_deref(), "aggregate")?,
                mutations,
                cause,
                detected_at: model.created_at,
            },
            resolved_at: model.resolved_at,
        })
    }
}

pub(crate) async fn record(db: &DatabaseConnection, report: &HazardReport) {
    let result = match ActiveModel::try_from(report) {
        Ok(model) => model.insert(db).await.map(|_| ()).map_err(EngineError::from),
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        tracing::error!(hazard_id = %report.id, "failed to persist hazard report: {err}");
    }
}

pub(crate) async fn list<C: ConnectionTrait>(
    db: &C,
    unresolved_only: bool,
) -> ResultEngine<Vec<HazardRecord>> {
    let mut query = Entity::find();
    if unresolved_only {
        query = query.filter(Column::ResolvedAt.is_null());
    }
    query
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(HazardRecord::try_from)
        .collect()
}

/// Mark a hazard as reconciled. Returns `false` when it does not exist or was
/// already resolved.
pub(crate) async fn resolve<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEngine<bool> {
    let Some(model) = Entity::find_by_id(id.to_string()).one(db).await? else {
        return Ok(false);
    };
    if model.resolved_at.is_some() {
        return Ok(false);
    }
    let mut active: ActiveModel = model.into();
    active.resolved_at = ActiveValue::Set(Some(Utc::now()));
    active.update(db).await?;
    Ok(true)
}
