#![allow(dead_code)]

use std::{
    collections::HashMap,
    time::Duration,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use uuid::Uuid;

use engine::{
    Broker, BrokerError, CategoryCmd, CategoryType, Engine, GatewayError, ObjectStore,
    OutboxMessage, StorageError, StoredObject, UploadRequest, WalletGateway, WalletSnapshot,
    inspect_payload,
};
use migration::MigratorTrait;

pub const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub fn png_base64() -> String {
    STANDARD.encode(PNG_HEADER)
}

/// In-memory wallet authority with optimistic versioning.
#[derive(Default)]
pub struct FakeWalletGateway {
    wallets: Mutex<HashMap<Uuid, WalletSnapshot>>,
    fetch_calls: AtomicUsize,
    apply_calls: AtomicUsize,
    failing_applies: Mutex<HashMap<Uuid, GatewayError>>,
    races: AtomicUsize,
}

impl FakeWalletGateway {
    pub fn add_wallet(&self, name: &str, balance_minor: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.wallets.lock().unwrap().insert(
            id,
            WalletSnapshot {
                id,
                owner: "alice".to_string(),
                name: name.to_string(),
                balance_minor,
                version: 1,
            },
        );
        id
    }

    pub fn balance(&self, id: Uuid) -> i64 {
        self.wallets.lock().unwrap()[&id].balance_minor
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Fail the next apply on `wallet_id` with `err`.
    pub fn fail_next_apply(&self, wallet_id: Uuid, err: GatewayError) {
        self.failing_applies.lock().unwrap().insert(wallet_id, err);
    }

    /// Make another writer bump the wallet right before each of the next
    /// `count` applies lands.
    pub fn race_next_applies(&self, count: usize) {
        self.races.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletGateway for FakeWalletGateway {
    async fn fetch(&self, wallet_id: Uuid) -> Result<WalletSnapshot, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.wallets
            .lock()
            .unwrap()
            .get(&wallet_id)
            .cloned()
            .ok_or(GatewayError::NotFound(wallet_id))
    }

    async fn apply(&self, wallet: &WalletSnapshot) -> Result<WalletSnapshot, GatewayError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failing_applies.lock().unwrap().remove(&wallet.id) {
            return Err(err);
        }
        let mut wallets = self.wallets.lock().unwrap();
        let stored = wallets
            .get_mut(&wallet.id)
            .ok_or(GatewayError::NotFound(wallet.id))?;
        let raced = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if raced {
            stored.version += 1;
        }
        if stored.version != wallet.version {
            return Err(GatewayError::VersionConflict(wallet.id));
        }
        stored.balance_minor = wallet.balance_minor;
        stored.version += 1;
        Ok(stored.clone())
    }
}

#[derive(Default)]
pub struct FakeObjectStore {
    uploads: Mutex<Vec<String>>,
    unavailable: AtomicBool,
    stall: Mutex<Option<Duration>>,
}

impl FakeObjectStore {
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn go_down(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// Make every upload hang for `delay` before answering.
    pub fn stall_uploads(&self, delay: Duration) {
        *self.stall.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn upload(&self, request: UploadRequest) -> Result<StoredObject, StorageError> {
        let stall = *self.stall.lock().unwrap();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("bucket offline".to_string()));
        }
        let info = inspect_payload(&request.base64_payload, &request.validation)
            .map_err(|err| StorageError::Invalid(err.to_string()))?;
        let mut uploads = self.uploads.lock().unwrap();
        let url = format!(
            "https://objects.test/{}/{}_{}.{}",
            request.bucket,
            request.prefix,
            uploads.len(),
            info.format
        );
        uploads.push(url.clone());
        Ok(StoredObject {
            url,
            size_bytes: info.size_bytes as i64,
            extension: info.format.to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeBroker {
    published: Mutex<Vec<OutboxMessage>>,
    failing: AtomicBool,
}

impl FakeBroker {
    pub fn published(&self) -> Vec<OutboxMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), BrokerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BrokerError("broker unreachable".to_string()));
        }
        self.published.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct Harness {
    pub engine: Engine,
    pub db: DatabaseConnection,
    pub wallets: Arc<FakeWalletGateway>,
    pub objects: Arc<FakeObjectStore>,
}

impl Harness {
    pub async fn new() -> Self {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        let wallets = Arc::new(FakeWalletGateway::default());
        let objects = Arc::new(FakeObjectStore::default());
        let engine = Engine::builder()
            .database(db.clone())
            .wallet_gateway(wallets.clone())
            .object_store(objects.clone())
            .build()
            .await
            .unwrap();
        Self {
            engine,
            db,
            wallets,
            objects,
        }
    }

    pub async fn root_category(&self, name: &str, kind: CategoryType) -> Uuid {
        self.engine
            .create_category(CategoryCmd::root(name, kind))
            .await
            .unwrap()
            .id
    }

    /// `(cash_out, cash_in)` categories for fund transfers.
    pub async fn transfer_categories(&self) -> (Uuid, Uuid) {
        (
            self.root_category("Cash out", CategoryType::FundTransfer)
                .await,
            self.root_category("Cash in", CategoryType::FundTransfer)
                .await,
        )
    }

    pub async fn count(&self, table: &str) -> i64 {
        self.scalar(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .await
    }

    pub async fn scalar(&self, sql: &str) -> i64 {
        self.db
            .query_one(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
            .await
            .unwrap()
            .unwrap()
            .try_get::<i64>("", "n")
            .unwrap()
    }

    /// Make every outbox insert fail from now on.
    pub async fn break_outbox(&self) {
        self.db
            .execute_unprepared(
                "CREATE TRIGGER fail_outbox BEFORE INSERT ON outbox_messages \
                 BEGIN SELECT RAISE(ABORT, 'outbox offline'); END;",
            )
            .await
            .unwrap();
    }

    /// Let every write go through but make its commit fail, through a deferred
    /// foreign key that is only checked at COMMIT.
    pub async fn break_commit(&self) {
        for sql in [
            "CREATE TABLE commit_guard_parent (id TEXT PRIMARY KEY)",
            "CREATE TABLE commit_guard (parent_id TEXT REFERENCES commit_guard_parent(id) \
             DEFERRABLE INITIALLY DEFERRED)",
            "CREATE TRIGGER fail_commit AFTER INSERT ON outbox_messages \
             BEGIN INSERT INTO commit_guard (parent_id) VALUES ('missing'); END;",
        ] {
            self.db.execute_unprepared(sql).await.unwrap();
        }
    }
}
