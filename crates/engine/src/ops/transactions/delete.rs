use uuid::Uuid;

use crate::{
    ResultEngine, TransactionView, attachments, categories,
    outbox::{self, EventType},
    saga::{Saga, SagaOperation},
    transactions,
    unit_of_work::UnitOfWork,
};

use super::{super::Engine, ensure_fits, load_view, wallet_effect};

impl Engine {
    /// Delete a transaction and revert its effect on the wallet: an expense
    /// is credited back, an income debited back. Transfer legs revert by
    /// their own direction. Returns the snapshot of the deleted row.
    pub async fn delete_transaction(&self, id: Uuid) -> ResultEngine<TransactionView> {
        let view = self
            .retry_on_conflict(SagaOperation::DeleteTransaction, || {
                self.delete_transaction_once(id)
            })
            .await?;
        tracing::info!(
            transaction_id = %view.id,
            wallet_id = %view.wallet_id,
            amount_minor = view.amount_minor,
            "transaction deleted"
        );
        Ok(view)
    }

    async fn delete_transaction_once(&self, id: Uuid) -> ResultEngine<TransactionView> {
        let unit = self.begin().await?;
        let mut saga = self.saga(SagaOperation::DeleteTransaction);
        match self.delete_transaction_steps(&unit, &mut saga, id).await {
            Ok(view) => {
                saga.commit(unit).await?;
                Ok(view)
            }
            Err(err) => Err(saga.abort(unit, err).await),
        }
    }

    async fn delete_transaction_steps(
        &self,
        unit: &UnitOfWork,
        saga: &mut Saga<'_>,
        id: Uuid,
    ) -> ResultEngine<TransactionView> {
        let existing = transactions::require(unit.connection(), id).await?;
        let category = categories::require(unit.connection(), existing.category_id).await?;
        let effect = wallet_effect(category.kind, existing.transfer_leg, existing.amount_minor)?;
        let view = load_view(unit.connection(), &existing).await?;

        let wallet = saga.fetch(existing.wallet_id).await?;
        ensure_fits(&wallet, -effect)?;
        saga.apply(&wallet, -effect).await?;
        saga.set_aggregate(id);

        attachments::delete_for_transaction(unit, id).await?;
        transactions::delete(unit, id).await?;
        outbox::stage(
            unit,
            id,
            EventType::TransactionDeleted,
            &view,
            self.settings.outbox_max_retries,
        )
        .await?;
        Ok(view)
    }
}
