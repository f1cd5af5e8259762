use std::{future::Future, sync::Arc};

use sea_orm::DatabaseConnection;

use crate::{
    EngineError, EngineSettings, ObjectStore, ResultEngine, WalletGateway,
    saga::{Saga, SagaOperation},
    unit_of_work::UnitOfWork,
};

mod attachments;
mod categories;
mod hazards;
mod transactions;

pub use categories::group_categories;
pub use transactions::TransactionListFilter;

/// Run a block inside a unit of work, committing on success and rolling back
/// on error. Only for writes that never touch a wallet.
macro_rules! with_unit {
    ($self:expr, |$unit:ident| $body:expr) => {{
        let $unit = $crate::unit_of_work::UnitOfWork::begin(&$self.database).await?;
        let result = $body;
        match result {
            Ok(value) => {
                $unit.commit().await?;
                Ok(value)
            }
            Err(err) => {
                $unit.rollback().await;
                Err(err)
            }
        }
    }};
}

pub(crate) use with_unit;

pub struct Engine {
    database: DatabaseConnection,
    wallets: Arc<dyn WalletGateway>,
    objects: Arc<dyn ObjectStore>,
    settings: EngineSettings,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Open a unit of work on the ledger store.
    pub async fn begin(&self) -> ResultEngine<UnitOfWork> {
        UnitOfWork::begin(&self.database).await
    }

    fn saga(&self, operation: SagaOperation) -> Saga<'_> {
        Saga::new(
            operation,
            self.wallets.as_ref(),
            self.database.clone(),
            self.settings.gateway_timeout(),
        )
    }

    /// Run `attempt` again while it fails with a version conflict, up to
    /// `max_conflict_retries` times. A conflict that escapes a saga always
    /// happened before any mutation of that attempt; later ones are hazards.
    async fn retry_on_conflict<T, F, Fut>(
        &self,
        operation: SagaOperation,
        mut attempt: F,
    ) -> ResultEngine<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ResultEngine<T>>,
    {
        let mut conflicts = 0;
        loop {
            match attempt().await {
                Err(EngineError::WalletConflict(wallet_id))
                    if conflicts < self.settings.max_conflict_retries =>
                {
                    conflicts += 1;
                    tracing::warn!(
                        operation = operation.as_str(),
                        %wallet_id,
                        attempt = conflicts,
                        "wallet version conflict, restarting operation"
                    );
                }
                other => return other,
            }
        }
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: Option<DatabaseConnection>,
    wallets: Option<Arc<dyn WalletGateway>>,
    objects: Option<Arc<dyn ObjectStore>>,
    settings: EngineSettings,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = Some(db);
        self
    }

    /// Pass the required wallet authority client
    pub fn wallet_gateway(mut self, gateway: Arc<dyn WalletGateway>) -> EngineBuilder {
        self.wallets = Some(gateway);
        self
    }

    /// Pass the required attachment store
    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> EngineBuilder {
        self.objects = Some(store);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> EngineBuilder {
        self.settings = settings;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let missing = |what: &str| EngineError::Configuration(format!("missing {what}"));
        Ok(Engine {
            database: self.database.ok_or_else(|| missing("database"))?,
            wallets: self.wallets.ok_or_else(|| missing("wallet gateway"))?,
            objects: self.objects.ok_or_else(|| missing("object store"))?,
            settings: self.settings,
        })
    }
}
