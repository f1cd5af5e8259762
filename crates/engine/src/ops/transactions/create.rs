use crate::{
    CreateOutcome, CreateRequest, CreateTransactionCmd, EngineError, ResultEngine,
    TransactionView, categories,
    outbox::{self, EventType},
    saga::{Saga, SagaOperation},
    transactions::{self, Transaction},
    unit_of_work::UnitOfWork,
    util::{ensure_positive, normalize_optional_text},
};

use super::{super::Engine, ensure_covers, load_view, wallet_effect};

impl Engine {
    /// Create a single transaction or a fund transfer.
    pub async fn create(&self, request: CreateRequest) -> ResultEngine<CreateOutcome> {
        match request {
            CreateRequest::Single(cmd) => self
                .create_transaction(cmd)
                .await
                .map(CreateOutcome::Single),
            CreateRequest::Transfer(cmd) => {
                self.fund_transfer(cmd).await.map(CreateOutcome::Transfer)
            }
        }
    }

    /// Record an expense or an income and apply it to the wallet.
    ///
    /// Replaying a command with an idempotency key that was already committed
    /// returns the stored transaction without calling the wallet authority.
    /// A replay whose wallet, category or amount differs from the stored row
    /// is an [`EngineError::IdempotencyConflict`].
    pub async fn create_transaction(
        &self,
        cmd: CreateTransactionCmd,
    ) -> ResultEngine<TransactionView> {
        if let Some(existing) = self.replayed(cmd.idempotency_key.as_deref()).await? {
            if existing.transfer_id.is_some()
                || existing.wallet_id != cmd.wallet_id
                || existing.category_id != cmd.category_id
                || existing.amount_minor != cmd.amount_minor
            {
                return Err(EngineError::IdempotencyConflict(
                    cmd.idempotency_key.unwrap_or_default(),
                ));
            }
            tracing::info!(
                transaction_id = %existing.id,
                "idempotent replay of create_transaction"
            );
            return load_view(&self.database, &existing).await;
        }
        ensure_positive(cmd.amount_minor, "amount_minor")?;
        self.check_payloads(cmd.attachments.iter().flat_map(|group| &group.files))?;

        let view = self
            .retry_on_conflict(SagaOperation::CreateTransaction, || {
                self.create_transaction_once(&cmd)
            })
            .await?;
        tracing::info!(
            transaction_id = %view.id,
            wallet_id = %view.wallet_id,
            amount_minor = view.amount_minor,
            "transaction created"
        );
        Ok(view)
    }

    async fn create_transaction_once(
        &self,
        cmd: &CreateTransactionCmd,
    ) -> ResultEngine<TransactionView> {
        let unit = self.begin().await?;
        let mut saga = self.saga(SagaOperation::CreateTransaction);
        match self.create_transaction_steps(&unit, &mut saga, cmd).await {
            Ok(view) => {
                saga.commit(unit).await?;
                Ok(view)
            }
            Err(err) => Err(saga.abort(unit, err).await),
        }
    }

    async fn create_transaction_steps(
        &self,
        unit: &UnitOfWork,
        saga: &mut Saga<'_>,
        cmd: &CreateTransactionCmd,
    ) -> ResultEngine<TransactionView> {
        let wallet = saga.fetch(cmd.wallet_id).await?;
        let category = categories::require(unit.connection(), cmd.category_id).await?;
        let effect = wallet_effect(category.kind, None, cmd.amount_minor)?;
        ensure_covers(&wallet, effect)?;

        saga.apply(&wallet, effect).await?;

        let tx = Transaction::new(
            cmd.wallet_id,
            cmd.category_id,
            cmd.amount_minor,
            cmd.transaction_date,
            normalize_optional_text(cmd.description.as_deref()).unwrap_or_default(),
        )?
        .with_idempotency_key(cmd.idempotency_key.clone());
        saga.set_aggregate(tx.id);
        transactions::insert(unit, &tx).await?;

        let mut stored = Vec::new();
        for group in &cmd.attachments {
            stored.extend(self.store_attachments(unit, tx.id, &group.files).await?);
        }

        let view = TransactionView::new(&tx, &category, stored);
        outbox::stage(
            unit,
            tx.id,
            EventType::TransactionCreated,
            &view,
            self.settings.outbox_max_retries,
        )
        .await?;
        Ok(view)
    }
}
