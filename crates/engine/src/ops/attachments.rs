use uuid::Uuid;

use crate::{AttachmentView, EngineError, ResultEngine, attachments, transactions};

use super::{Engine, with_unit};

impl Engine {
    pub async fn attachment(&self, id: Uuid) -> ResultEngine<AttachmentView> {
        attachments::find(&self.database, id)
            .await?
            .map(AttachmentView::from)
            .ok_or(EngineError::AttachmentNotFound(id))
    }

    /// Attachments of one transaction, oldest first.
    pub async fn attachments_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> ResultEngine<Vec<AttachmentView>> {
        transactions::require(&self.database, transaction_id).await?;
        let rows = attachments::for_transaction(&self.database, transaction_id).await?;
        Ok(rows.into_iter().map(AttachmentView::from).collect())
    }

    /// Remove one attachment row. The stored object is left in place.
    pub async fn delete_attachment(&self, id: Uuid) -> ResultEngine<()> {
        with_unit!(self, |unit| {
            match attachments::find(unit.connection(), id).await {
                Ok(Some(_)) => attachments::delete(&unit, id).await,
                Ok(None) => Err(EngineError::AttachmentNotFound(id)),
                Err(err) => Err(err),
            }
        })?;
        tracing::info!(attachment_id = %id, "attachment deleted");
        Ok(())
    }
}
