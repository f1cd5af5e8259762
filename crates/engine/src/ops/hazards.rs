use uuid::Uuid;

use crate::{HazardRecord, ResultEngine, hazards};

use super::Engine;

impl Engine {
    /// Recorded partial commits, oldest first.
    pub async fn hazards(&self, unresolved_only: bool) -> ResultEngine<Vec<HazardRecord>> {
        hazards::list(&self.database, unresolved_only).await
    }

    /// Mark a hazard as reconciled by an operator.
    pub async fn resolve_hazard(&self, id: Uuid) -> ResultEngine<bool> {
        let resolved = hazards::resolve(&self.database, id).await?;
        if resolved {
            tracing::info!(hazard_id = %id, "hazard resolved");
        }
        Ok(resolved)
    }
}
