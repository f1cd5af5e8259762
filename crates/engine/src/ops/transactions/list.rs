use base64::Engine as _;
use chrono::{DateTime, Utc};
use sea_orm::{Condition, QueryFilter, QueryOrder, QuerySelect, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, Transaction, TransactionView, transactions};

use super::{super::Engine, load_view};

/// Filters for listing transactions. Fund transfer legs are listed like any
/// other row of their wallet.
///
/// `from` is inclusive and `to` is exclusive (`[from, to)`), both in UTC.
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    /// Empty means every wallet.
    pub wallet_ids: Vec<Uuid>,
    pub category_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn validate_list_filter(filter: &TransactionListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from >= to
    {
        return Err(EngineError::InvalidRange(
            "from must be before to".to_string(),
        ));
    }
    Ok(())
}

trait ApplyTxFilters: QueryFilter + Sized {
    fn apply_tx_filters(self, filter: &TransactionListFilter) -> Self;
}

impl<T> ApplyTxFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_tx_filters(mut self, filter: &TransactionListFilter) -> Self {
        if !filter.wallet_ids.is_empty() {
            self = self.filter(
                transactions::Column::WalletId
                    .is_in(filter.wallet_ids.iter().map(Uuid::to_string)),
            );
        }
        if let Some(category_id) = filter.category_id {
            self = self.filter(transactions::Column::CategoryId.eq(category_id.to_string()));
        }
        if let Some(from) = filter.from {
            self = self.filter(transactions::Column::TransactionDate.gte(from));
        }
        if let Some(to) = filter.to {
            self = self.filter(transactions::Column::TransactionDate.lt(to));
        }
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TransactionsCursor {
    transaction_date: DateTime<Utc>,
    transaction_id: String,
}

impl TransactionsCursor {
    fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|_| EngineError::InvalidCursor("invalid transactions cursor".to_string()))
    }
}

impl Engine {
    /// Single transaction by id, with its category and attachments.
    pub async fn transaction(&self, id: Uuid) -> ResultEngine<TransactionView> {
        let tx = transactions::require(&self.database, id).await?;
        load_view(&self.database, &tx).await
    }

    /// Lists transactions with cursor-based pagination.
    ///
    /// Pagination is newest → older by `(transaction_date DESC, id DESC)`.
    pub async fn list_transactions_page(
        &self,
        limit: u64,
        cursor: Option<&str>,
        filter: &TransactionListFilter,
    ) -> ResultEngine<(Vec<TransactionView>, Option<String>)> {
        validate_list_filter(filter)?;

        let limit_plus_one = limit.saturating_add(1);
        let mut query = transactions::Entity::find()
            .order_by_desc(transactions::Column::TransactionDate)
            .order_by_desc(transactions::Column::Id)
            .limit(limit_plus_one);

        if let Some(cursor) = cursor {
            let cursor = TransactionsCursor::decode(cursor)?;
            query = query.filter(
                Condition::any()
                    .add(transactions::Column::TransactionDate.lt(cursor.transaction_date))
                    .add(
                        Condition::all()
                            .add(transactions::Column::TransactionDate.eq(cursor.transaction_date))
                            .add(transactions::Column::Id.lt(cursor.transaction_id)),
                    ),
            );
        }
        query = query.apply_tx_filters(filter);

        let rows: Vec<transactions::Model> = query.all(&self.database).await?;
        let has_more = rows.len() > limit as usize;

        let mut out: Vec<TransactionView> = Vec::with_capacity(rows.len().min(limit as usize));
        for model in rows.into_iter().take(limit as usize) {
            let tx = Transaction::try_from(model)?;
            out.push(load_view(&self.database, &tx).await?);
        }

        let next_cursor = if has_more {
            out.last()
                .map(|tx| TransactionsCursor {
                    transaction_date: tx.transaction_date,
                    transaction_id: tx.id.to_string(),
                })
                .map(|c| c.encode())
                .transpose()?
        } else {
            None
        };

        Ok((out, next_cursor))
    }
}
