use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    Category, CategoryCmd, CategoryEntry, CategoryGroup, CategoryType, CategoryView, EngineError,
    ResultEngine, categories, transactions,
    unit_of_work::UnitOfWork,
    util::normalize_required_name,
};

use super::{Engine, with_unit};

/// Group flat category rows into one bucket per root name.
///
/// Buckets come out in the order their root rows appear. Children keep row
/// order and are attached even when they come before their parent. Children
/// whose parent is missing are dropped.
pub fn group_categories(rows: &[Category]) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    let mut root_names: HashMap<Uuid, &str> = HashMap::new();

    for row in rows.iter().filter(|row| row.parent_id.is_none()) {
        root_names.insert(row.id, row.name.as_str());
        if by_name.contains_key(row.name.as_str()) {
            continue;
        }
        by_name.insert(row.name.as_str(), groups.len());
        groups.push(CategoryGroup {
            group_id: row.id,
            group_name: row.name.clone(),
            kind: row.kind,
            categories: Vec::new(),
        });
    }

    for row in rows {
        let Some(parent_id) = row.parent_id else {
            continue;
        };
        let Some(index) = root_names
            .get(&parent_id)
            .and_then(|name| by_name.get(name))
        else {
            tracing::warn!(category_id = %row.id, %parent_id, "category parent not found");
            continue;
        };
        groups[*index].categories.push(CategoryEntry {
            id: row.id,
            name: row.name.clone(),
        });
    }

    groups
}

impl Engine {
    /// All categories grouped under their root.
    pub async fn categories_grouped(&self) -> ResultEngine<Vec<CategoryGroup>> {
        let rows = categories::all(&self.database).await?;
        Ok(group_categories(&rows))
    }

    pub async fn category(&self, id: Uuid) -> ResultEngine<CategoryView> {
        let category = categories::require(&self.database, id).await?;
        Ok(CategoryView::from(&category))
    }

    pub async fn categories_by_type(&self, kind: CategoryType) -> ResultEngine<Vec<CategoryView>> {
        let rows = categories::by_type(&self.database, kind).await?;
        Ok(rows.iter().map(CategoryView::from).collect())
    }

    /// Create a category. A child takes the type of its parent; a root needs
    /// an explicit type.
    pub async fn create_category(&self, cmd: CategoryCmd) -> ResultEngine<CategoryView> {
        let name = normalize_required_name(&cmd.name, "category")?;
        let category = with_unit!(self, |unit| {
            create_category_in(&unit, name, &cmd).await
        })?;
        tracing::info!(
            category_id = %category.id,
            kind = category.kind.as_str(),
            "category created"
        );
        Ok(CategoryView::from(&category))
    }

    /// Rename or move a category.
    ///
    /// The type of a category that transactions already use cannot change,
    /// since it decides their wallet effect.
    pub async fn update_category(&self, id: Uuid, cmd: CategoryCmd) -> ResultEngine<CategoryView> {
        let name = normalize_required_name(&cmd.name, "category")?;
        let category = with_unit!(self, |unit| {
            update_category_in(&unit, id, name, &cmd).await
        })?;
        tracing::info!(category_id = %category.id, "category updated");
        Ok(CategoryView::from(&category))
    }

    /// Delete a category nobody points at.
    pub async fn delete_category(&self, id: Uuid) -> ResultEngine<()> {
        with_unit!(self, |unit| {
            delete_category_in(&unit, id).await
        })?;
        tracing::info!(category_id = %id, "category deleted");
        Ok(())
    }
}

async fn resolve_kind(
    unit: &UnitOfWork,
    id: Option<Uuid>,
    cmd: &CategoryCmd,
    fallback: Option<CategoryType>,
) -> ResultEngine<CategoryType> {
    let Some(parent_id) = cmd.parent_id else {
        return cmd.kind.or(fallback).ok_or_else(|| {
            EngineError::InvalidCategoryType("root category needs a type".to_string())
        });
    };
    if Some(parent_id) == id {
        return Err(EngineError::InvalidCategoryType(
            "category cannot be its own parent".to_string(),
        ));
    }
    let parent = categories::require(unit.connection(), parent_id).await?;
    if parent.parent_id.is_some() {
        return Err(EngineError::InvalidCategoryType(
            "parent must be a root category".to_string(),
        ));
    }
    Ok(parent.kind)
}

async fn create_category_in(
    unit: &UnitOfWork,
    name: String,
    cmd: &CategoryCmd,
) -> ResultEngine<Category> {
    let kind = resolve_kind(unit, None, cmd, None).await?;
    let category = Category {
        id: Uuid::new_v4(),
        parent_id: cmd.parent_id,
        name,
        kind,
    };
    categories::insert(unit, &category).await?;
    Ok(category)
}

async fn update_category_in(
    unit: &UnitOfWork,
    id: Uuid,
    name: String,
    cmd: &CategoryCmd,
) -> ResultEngine<Category> {
    let existing = categories::require(unit.connection(), id).await?;
    let kind = resolve_kind(unit, Some(id), cmd, Some(existing.kind)).await?;

    if cmd.parent_id.is_some() && categories::children_count(unit.connection(), id).await? > 0 {
        return Err(EngineError::InvalidCategoryType(
            "category with children cannot become a child".to_string(),
        ));
    }
    // Children carry their root's type, so a retype moves the whole bucket.
    let children = if kind == existing.kind {
        Vec::new()
    } else {
        let children = categories::children(unit.connection(), id).await?;
        for category_id in std::iter::once(id).chain(children.iter().map(|child| child.id)) {
            if transactions::count_for_category(unit.connection(), category_id).await? > 0 {
                return Err(EngineError::CategoryInUse(category_id));
            }
        }
        children
    };

    let category = Category {
        id,
        parent_id: cmd.parent_id,
        name,
        kind,
    };
    categories::update(unit, &category).await?;
    for mut child in children {
        child.kind = kind;
        categories::update(unit, &child).await?;
    }
    Ok(category)
}

async fn delete_category_in(unit: &UnitOfWork, id: Uuid) -> ResultEngine<()> {
    categories::require(unit.connection(), id).await?;
    if transactions::count_for_category(unit.connection(), id).await? > 0
        || categories::children_count(unit.connection(), id).await? > 0
    {
        return Err(EngineError::CategoryInUse(id));
    }
    categories::delete(unit, id).await
}
