//! Transaction boundary for ledger writes.
//!
//! A `UnitOfWork` owns one database transaction. Every write helper takes it by
//! reference, so business rows and outbox rows of one operation always land in
//! the same commit. Dropping an uncommitted unit rolls it back.

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};

use crate::ResultEngine;

pub struct UnitOfWork {
    tx: DatabaseTransaction,
}

impl UnitOfWork {
    pub(crate) async fn begin(db: &DatabaseConnection) -> ResultEngine<Self> {
        Ok(Self {
            tx: db.begin().await?,
        })
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.tx
    }

    pub async fn commit(self) -> Result<(), DbErr> {
        self.tx.commit().await
    }

    pub async fn rollback(self) {
        if let Err(err) = self.tx.rollback().await {
            tracing::warn!("unit of work rollback failed: {err}");
        }
    }
}
