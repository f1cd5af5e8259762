use uuid::Uuid;

use crate::{
    EngineError, FundTransferCmd, FundTransferView, ResultEngine, TransactionView, TransferLeg,
    categories,
    outbox::{self, EventType},
    saga::{Saga, SagaOperation},
    transactions::{self, Transaction},
    unit_of_work::UnitOfWork,
    util::{ensure_positive, normalize_optional_text},
};

use super::{super::Engine, ensure_covers, ensure_fits, load_view};

impl Engine {
    /// Move `amount_minor` from one wallet to another.
    ///
    /// The source wallet pays the amount plus the admin fee. Two rows are
    /// written, one per leg, linked by a shared `transfer_id`, and each gets
    /// its own `transaction.created` event.
    pub async fn fund_transfer(&self, cmd: FundTransferCmd) -> ResultEngine<FundTransferView> {
        if cmd.from_wallet_id == cmd.to_wallet_id {
            return Err(EngineError::SameWallet);
        }
        if let Some(existing) = self.replayed(cmd.idempotency_key.as_deref()).await? {
            let Some(transfer_id) = existing.transfer_id else {
                return Err(EngineError::IdempotencyConflict(
                    cmd.idempotency_key.unwrap_or_default(),
                ));
            };
            let stored = self.transfer_view(transfer_id).await?;
            if stored.from_wallet_id != cmd.from_wallet_id
                || stored.to_wallet_id != cmd.to_wallet_id
                || stored.amount_minor != cmd.amount_minor
                || stored.admin_fee_minor != cmd.admin_fee_minor
            {
                return Err(EngineError::IdempotencyConflict(
                    cmd.idempotency_key.unwrap_or_default(),
                ));
            }
            tracing::info!(%transfer_id, "idempotent replay of fund_transfer");
            return Ok(stored);
        }
        ensure_positive(cmd.amount_minor, "amount_minor")?;
        if cmd.admin_fee_minor < 0 {
            return Err(EngineError::InvalidAmount(
                "admin_fee_minor must be >= 0".to_string(),
            ));
        }

        let view = self
            .retry_on_conflict(SagaOperation::FundTransfer, || self.fund_transfer_once(&cmd))
            .await?;
        tracing::info!(
            transfer_id = %view.transfer_id,
            from_wallet_id = %view.from_wallet_id,
            to_wallet_id = %view.to_wallet_id,
            amount_minor = view.amount_minor,
            admin_fee_minor = view.admin_fee_minor,
            "fund transfer created"
        );
        Ok(view)
    }

    async fn fund_transfer_once(&self, cmd: &FundTransferCmd) -> ResultEngine<FundTransferView> {
        let unit = self.begin().await?;
        let mut saga = self.saga(SagaOperation::FundTransfer);
        match self.fund_transfer_steps(&unit, &mut saga, cmd).await {
            Ok(view) => {
                saga.commit(unit).await?;
                Ok(view)
            }
            Err(err) => Err(saga.abort(unit, err).await),
        }
    }

    async fn fund_transfer_steps(
        &self,
        unit: &UnitOfWork,
        saga: &mut Saga<'_>,
        cmd: &FundTransferCmd,
    ) -> ResultEngine<FundTransferView> {
        let from = saga.fetch(cmd.from_wallet_id).await?;
        let to = saga.fetch(cmd.to_wallet_id).await?;
        let cash_out_category =
            categories::require(unit.connection(), cmd.cash_out_category_id).await?;
        let cash_in_category =
            categories::require(unit.connection(), cmd.cash_in_category_id).await?;

        let total_minor = cmd
            .amount_minor
            .checked_add(cmd.admin_fee_minor)
            .ok_or_else(|| EngineError::InvalidAmount("amount plus fee overflows".to_string()))?;
        ensure_covers(&from, -total_minor)?;
        ensure_fits(&to, cmd.amount_minor)?;

        saga.apply(&from, -total_minor).await?;
        saga.apply(&to, cmd.amount_minor).await?;

        let transfer_id = Uuid::new_v4();
        saga.set_aggregate(transfer_id);
        let description = normalize_optional_text(cmd.description.as_deref());

        let cash_out = Transaction::new(
            from.id,
            cash_out_category.id,
            total_minor,
            cmd.transaction_date,
            description
                .clone()
                .unwrap_or_else(|| format!("fund transfer to {}", to.name)),
        )?
        .leg_of(transfer_id, TransferLeg::CashOut)
        .with_idempotency_key(cmd.idempotency_key.clone());
        let cash_in = Transaction::new(
            to.id,
            cash_in_category.id,
            cmd.amount_minor,
            cmd.transaction_date,
            description.unwrap_or_else(|| format!("fund transfer from {}", from.name)),
        )?
        .leg_of(transfer_id, TransferLeg::CashIn);

        transactions::insert(unit, &cash_out).await?;
        transactions::insert(unit, &cash_in).await?;

        let cash_out = TransactionView::new(&cash_out, &cash_out_category, Vec::new());
        let cash_in = TransactionView::new(&cash_in, &cash_in_category, Vec::new());
        for leg in [&cash_out, &cash_in] {
            outbox::stage(
                unit,
                leg.id,
                EventType::TransactionCreated,
                leg,
                self.settings.outbox_max_retries,
            )
            .await?;
        }

        Ok(FundTransferView::new(cash_out, cash_in))
    }

    /// A committed fund transfer, rebuilt from its two legs.
    pub async fn transfer_view(&self, transfer_id: Uuid) -> ResultEngine<FundTransferView> {
        let legs = transactions::transfer_legs(&self.database, transfer_id).await?;
        let mut cash_out = None;
        let mut cash_in = None;
        for leg in &legs {
            let view = load_view(&self.database, leg).await?;
            match leg.transfer_leg {
                Some(TransferLeg::CashOut) => cash_out = Some(view),
                Some(TransferLeg::CashIn) => cash_in = Some(view),
                None => {}
            }
        }
        match (cash_out, cash_in) {
            (Some(cash_out), Some(cash_in)) => Ok(FundTransferView::new(cash_out, cash_in)),
            _ => Err(EngineError::TransactionNotFound(transfer_id)),
        }
    }
}
