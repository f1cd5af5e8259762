//! Category registry.
//!
//! Categories form a one-level tree: a root category groups the children that
//! point at it through `parent_id`. The category type decides the sign of a
//! transaction's wallet effect.

use sea_orm::{ActiveValue, PaginatorTrait, QueryFilter, QueryOrder, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    unit_of_work::UnitOfWork,
    util::{parse_optional_uuid, parse_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    Income,
    Expense,
    FundTransfer,
}

impl CategoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::FundTransfer => "fund_transfer",
        }
    }
}

impl TryFrom<&str> for CategoryType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "fund_transfer" => Ok(Self::FundTransfer),
            other => Err(EngineError::InvalidCategoryType(format!(
                "unknown category type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub kind: CategoryType,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    #[sea_orm(column_name = "type")]
    pub kind: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Parent,
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Category> for ActiveModel {
    fn from(category: &Category) -> Self {
        Self {
            id: ActiveValue::Set(category.id.to_string()),
            parent_id: ActiveValue::Set(category.parent_id.map(|id| id.to_string())),
            name: ActiveValue::Set(category.name.clone()),
            kind: ActiveValue::Set(category.kind.as_str().to_string()),
        }
    }
}

impl TryFrom<Model> for Category {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "category")?,
            parent_id: parse_optional_uuid(model.parent_id.as_deref(), "parent category")?,
            name: model.name,
            kind: CategoryType::try_from(model.kind.as_str())?,
        })
    }
}

pub(crate) async fn find<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEngine<Option<Category>> {
    Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(Category::try_from)
        .transpose()
}

pub(crate) async fn require<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEngine<Category> {
    find(db, id).await?.ok_or(EngineError::CategoryNotFound(id))
}

/// Every category row, ordered by name.
pub(crate) async fn all<C: ConnectionTrait>(db: &C) -> ResultEngine<Vec<Category>> {
    Entity::find()
        .order_by_asc(Column::Name)
        .order_by_asc(Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(Category::try_from)
        .collect()
}

pub(crate) async fn by_type<C: ConnectionTrait>(
    db: &C,
    kind: CategoryType,
) -> ResultEngine<Vec<Category>> {
    Entity::find()
        .filter(Column::Kind.eq(kind.as_str()))
        .order_by_asc(Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(Category::try_from)
        .collect()
}

pub(crate) async fn children<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEngine<Vec<Category>> {
    Entity::find()
        .filter(Column::ParentId.eq(id.to_string()))
        .order_by_asc(Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(Category::try_from)
        .collect()
}

pub(crate) async fn children_count<C: ConnectionTrait>(db: &C, id: Uuid) -> ResultEngine<u64> {
    Ok(Entity::find()
        .filter(Column::ParentId.eq(id.to_string()))
        .count(db)
        .await?)
}

pub(crate) async fn insert(unit: &UnitOfWork, category: &Category) -> ResultEngine<()> {
    ActiveModel::from(category).insert(unit.connection()).await?;
    Ok(())
}

pub(crate) async fn update(unit: &UnitOfWork, category: &Category) -> ResultEngine<()> {
    ActiveModel::from(category).update(unit.connection()).await?;
    Ok(())
}

pub(crate) async fn delete(unit: &UnitOfWork, id: Uuid) -> ResultEngine<()> {
    Entity::delete_by_id(id.to_string())
        .exec(unit.connection())
        .await?;
    Ok(())
}
