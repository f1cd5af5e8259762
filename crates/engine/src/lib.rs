//! Ledger engine.
//!
//! Records expense/income transactions and fund transfers against wallets held
//! by an external wallet authority, and stages a domain event for every
//! committed write through a transactional outbox.
//!
//! Every write operation is a small saga:
//!
//! 1. open a [`UnitOfWork`](unit_of_work::UnitOfWork) against the ledger store
//! 2. fetch the wallet(s) and validate
//! 3. apply the wallet mutation(s) through the [`WalletGateway`]
//! 4. write the business rows and the outbox row inside the unit
//! 5. commit
//!
//! Step 3 cannot be undone by a local rollback. A failure after it is
//! reported as [`EngineError::PartialCommitHazard`] and recorded in the
//! hazard log instead of being folded into a generic error.

pub use attachments::Attachment;
pub use categories::{Category, CategoryType};
pub use commands::{
    AttachmentGroup, AttachmentOp, CategoryCmd, CreateRequest, CreateTransactionCmd,
    FundTransferCmd, UpdateTransactionCmd,
};
pub use error::{EngineError, ErrorClass};
pub use gateway::{GatewayError, HttpWalletGateway, WalletGateway, WalletSnapshot};
pub use hazards::HazardRecord;
pub use ops::{Engine, EngineBuilder, TransactionListFilter, group_categories};
pub use outbox::{EventType, OutboxMessage};
pub use publisher::{Broker, BrokerError, OutboxPublisher, PublishReport, PublisherSettings};
pub use saga::{HazardCause, HazardReport, SagaOperation, WalletMutation};
pub use settings::EngineSettings;
pub use storage::{
    ObjectStore, PayloadInfo, StorageError, StoredObject, UploadRequest, ValidationRules,
    inspect_payload,
};
pub use unit_of_work::UnitOfWork;
pub use transactions::{Transaction, TransferLeg};
pub use views::{
    AttachmentView, CategoryEntry, CategoryGroup, CategoryView, CreateOutcome,
    FundTransferView, TransactionView,
};

mod attachments;
mod categories;
mod commands;
mod error;
mod gateway;
mod hazards;
mod ops;
mod outbox;
mod publisher;
mod saga;
mod settings;
mod storage;
mod transactions;
mod unit_of_work;
mod util;
mod views;

type ResultEngine<T> = Result<T, EngineError>;
