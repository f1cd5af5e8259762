use chrono::Utc;
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine, TransactionView, UpdateTransactionCmd, attachments, categories,
    commands::ParsedAttachmentOp,
    outbox::{self, EventType},
    saga::{Saga, SagaOperation},
    transactions,
    unit_of_work::UnitOfWork,
    util::{ensure_positive, normalize_optional_text},
};

use super::{super::Engine, ensure_covers, ensure_fits, load_view, wallet_effect};

impl Engine {
    /// Change a transaction and move its wallet effect with it.
    ///
    /// - Wallet changed: the old wallet gets the old effect reverted, then the
    ///   new wallet gets the new effect. That is two wallet writes.
    /// - Same wallet: one write with the difference between the new and the
    ///   old effect, skipped when it is zero.
    ///
    /// Transfer legs keep their wallet, category and amount.
    pub async fn update_transaction(
        &self,
        id: Uuid,
        cmd: UpdateTransactionCmd,
    ) -> ResultEngine<TransactionView> {
        let ops = cmd
            .attachments
            .iter()
            .map(ParsedAttachmentOp::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        if let Some(amount_minor) = cmd.amount_minor {
            ensure_positive(amount_minor, "amount_minor")?;
        }
        self.check_payloads(
            ops.iter()
                .filter_map(|op| match op {
                    ParsedAttachmentOp::Create(files) => Some(files),
                    ParsedAttachmentOp::Delete(_) => None,
                })
                .flatten(),
        )?;

        let view = self
            .retry_on_conflict(SagaOperation::UpdateTransaction, || {
                self.update_transaction_once(id, &cmd, &ops)
            })
            .await?;
        tracing::info!(
            transaction_id = %view.id,
            wallet_id = %view.wallet_id,
            amount_minor = view.amount_minor,
            "transaction updated"
        );
        Ok(view)
    }

    async fn update_transaction_once(
        &self,
        id: Uuid,
        cmd: &UpdateTransactionCmd,
        ops: &[ParsedAttachmentOp],
    ) -> ResultEngine<TransactionView> {
        let unit = self.begin().await?;
        let mut saga = self.saga(SagaOperation::UpdateTransaction);
        match self
            .update_transaction_steps(&unit, &mut saga, id, cmd, ops)
            .await
        {
            Ok(view) => {
                saga.commit(unit).await?;
                Ok(view)
            }
            Err(err) => Err(saga.abort(unit, err).await),
        }
    }

    async fn update_transaction_steps(
        &self,
        unit: &UnitOfWork,
        saga: &mut Saga<'_>,
        id: Uuid,
        cmd: &UpdateTransactionCmd,
        ops: &[ParsedAttachmentOp],
    ) -> ResultEngine<TransactionView> {
        let existing = transactions::require(unit.connection(), id).await?;
        let old_category = categories::require(unit.connection(), existing.category_id).await?;
        let new_category = match cmd.category_id {
            Some(category_id) if category_id != existing.category_id => {
                categories::require(unit.connection(), category_id).await?
            }
            _ => old_category.clone(),
        };
        let new_wallet_id = cmd.wallet_id.unwrap_or(existing.wallet_id);
        let new_amount_minor = cmd.amount_minor.unwrap_or(existing.amount_minor);

        let wallet_changed = new_wallet_id != existing.wallet_id;
        let effect_changed = wallet_changed
            || new_category.id != existing.category_id
            || new_amount_minor != existing.amount_minor;
        if effect_changed && existing.transfer_leg.is_some() {
            return Err(EngineError::InvalidCategoryType(
                "transfer legs cannot change wallet, category or amount".to_string(),
            ));
        }

        for op in ops {
            if let ParsedAttachmentOp::Delete(ids) = op {
                for attachment_id in ids {
                    let attachment = attachments::find(unit.connection(), *attachment_id)
                        .await?
                        .ok_or(EngineError::AttachmentNotFound(*attachment_id))?;
                    if attachment.transaction_id != id {
                        return Err(EngineError::InvalidAttachmentOperation(format!(
                            "attachment {attachment_id} does not belong to transaction {id}"
                        )));
                    }
                }
            }
        }

        if effect_changed {
            let old_effect =
                wallet_effect(old_category.kind, existing.transfer_leg, existing.amount_minor)?;
            let new_effect =
                wallet_effect(new_category.kind, existing.transfer_leg, new_amount_minor)?;
            if wallet_changed {
                let old_wallet = saga.fetch(existing.wallet_id).await?;
                let new_wallet = saga.fetch(new_wallet_id).await?;
                ensure_fits(&old_wallet, -old_effect)?;
                ensure_covers(&new_wallet, new_effect)?;
                saga.apply(&old_wallet, -old_effect).await?;
                saga.apply(&new_wallet, new_effect).await?;
            } else {
                let delta_minor = new_effect.checked_sub(old_effect).ok_or_else(|| {
                    EngineError::InvalidAmount("amount change overflows".to_string())
                })?;
                if delta_minor != 0 {
                    let wallet = saga.fetch(existing.wallet_id).await?;
                    ensure_covers(&wallet, delta_minor)?;
                    saga.apply(&wallet, delta_minor).await?;
                }
            }
        }
        saga.set_aggregate(id);

        let mut updated = existing;
        updated.wallet_id = new_wallet_id;
        updated.category_id = new_category.id;
        updated.amount_minor = new_amount_minor;
        if let Some(transaction_date) = cmd.transaction_date {
            updated.transaction_date = transaction_date;
        }
        if let Some(description) = normalize_optional_text(cmd.description.as_deref()) {
            updated.description = description;
        }
        updated.updated_at = Utc::now();
        transactions::update(unit, &updated).await?;

        for op in ops {
            match op {
                ParsedAttachmentOp::Create(files) => {
                    self.store_attachments(unit, id, files).await?;
                }
                ParsedAttachmentOp::Delete(ids) => {
                    for attachment_id in ids {
                        attachments::delete(unit, *attachment_id).await?;
                    }
                }
            }
        }

        let view = load_view(unit.connection(), &updated).await?;
        outbox::stage(
            unit,
            id,
            EventType::TransactionUpdated,
            &view,
            self.settings.outbox_max_retries,
        )
        .await?;
        Ok(view)
    }
}
