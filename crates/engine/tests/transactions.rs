use std::time::Duration;

use chrono::Utc;
use engine::{
    AttachmentGroup, CategoryType, CreateOutcome, CreateRequest, CreateTransactionCmd,
    EngineError, ErrorClass, GatewayError, HazardCause, TransactionListFilter,
};
use uuid::Uuid;

mod common;

use common::{Harness, png_base64};

#[tokio::test]
async fn expense_debits_wallet_and_stages_one_event() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;

    let view = h
        .engine
        .create_transaction(
            CreateTransactionCmd::new(wallet, food, 200, Utc::now()).description("  lunch  "),
        )
        .await
        .unwrap();

    assert_eq!(h.wallets.balance(wallet), 800);
    assert_eq!(view.description, "lunch");
    assert_eq!(view.category.kind, CategoryType::Expense);
    assert_eq!(h.count("transactions").await, 1);
    assert_eq!(
        h.scalar(&format!(
            "SELECT COUNT(*) AS n FROM outbox_messages \
             WHERE aggregate_id = '{}' AND event_type = 'transaction.created' AND published = 0",
            view.id
        ))
        .await,
        1
    );
}

#[tokio::test]
async fn income_credits_wallet() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Bank", 50);
    let salary = h.root_category("Salary", CategoryType::Income).await;

    h.engine
        .create_transaction(CreateTransactionCmd::new(wallet, salary, 1_500, Utc::now()))
        .await
        .unwrap();

    assert_eq!(h.wallets.balance(wallet), 1_550);
}

#[tokio::test]
async fn create_dispatches_on_request_kind() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;

    let outcome = h
        .engine
        .create(CreateRequest::Single(CreateTransactionCmd::new(
            wallet,
            food,
            10,
            Utc::now(),
        )))
        .await
        .unwrap();

    assert!(matches!(outcome, CreateOutcome::Single(view) if view.amount_minor == 10));
}

#[tokio::test]
async fn same_idempotency_key_applies_once() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    let cmd = CreateTransactionCmd::new(wallet, food, 200, Utc::now()).idempotency_key("req-1");

    let first = h.engine.create_transaction(cmd.clone()).await.unwrap();
    let second = h.engine.create_transaction(cmd).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(h.wallets.balance(wallet), 800);
    assert_eq!(h.wallets.apply_calls(), 1);
    assert_eq!(h.count("transactions").await, 1);
    assert_eq!(h.count("outbox_messages").await, 1);
}

#[tokio::test]
async fn non_positive_amount_never_reaches_the_wallet() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;

    for amount in [0, -5] {
        let err = h
            .engine
            .create_transaction(CreateTransactionCmd::new(wallet, food, amount, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    assert_eq!(h.wallets.fetch_calls(), 0);
    assert_eq!(h.wallets.apply_calls(), 0);
    assert_eq!(h.wallets.balance(wallet), 1_000);
}

#[tokio::test]
async fn insufficient_balance_writes_nothing() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 100);
    let food = h.root_category("Food", CategoryType::Expense).await;

    let err = h
        .engine
        .create_transaction(CreateTransactionCmd::new(wallet, food, 200, Utc::now()))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(h.wallets.apply_calls(), 0);
    assert_eq!(h.wallets.balance(wallet), 100);
    assert_eq!(h.count("transactions").await, 0);
    assert_eq!(h.count("outbox_messages").await, 0);
}

#[tokio::test]
async fn unknown_wallet_and_category_are_not_found() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;

    let missing_wallet = Uuid::new_v4();
    let err = h
        .engine
        .create_transaction(CreateTransactionCmd::new(missing_wallet, food, 1, Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WalletNotFound(id) if id == missing_wallet));

    let err = h
        .engine
        .create_transaction(CreateTransactionCmd::new(wallet, Uuid::new_v4(), 1, Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CategoryNotFound(_)));
    assert_eq!(err.class(), ErrorClass::NotFound);
    assert_eq!(h.wallets.apply_calls(), 0);
}

#[tokio::test]
async fn fund_transfer_category_is_not_a_plain_transaction() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let (cash_out, _) = h.transfer_categories().await;

    let err = h
        .engine
        .create_transaction(CreateTransactionCmd::new(wallet, cash_out, 10, Utc::now()))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidCategoryType(_)));
    assert_eq!(h.wallets.apply_calls(), 0);
}

#[tokio::test]
async fn local_failure_after_apply_is_a_partial_commit_hazard() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    h.break_outbox().await;

    let err = h
        .engine
        .create_transaction(CreateTransactionCmd::new(wallet, food, 200, Utc::now()))
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::PartialCommitHazard);
    let report = err.hazard().unwrap();
    assert!(matches!(report.cause, HazardCause::LocalWriteFailed(_)));
    assert_eq!(report.mutations.len(), 1);
    assert_eq!(report.mutations[0].wallet_id, wallet);
    assert_eq!(report.mutations[0].compensation_minor(), 200);

    // The wallet keeps the mutation; nothing local survives.
    assert_eq!(h.wallets.balance(wallet), 800);
    assert_eq!(h.count("transactions").await, 0);
    assert_eq!(h.count("outbox_messages").await, 0);
    assert_eq!(h.count("saga_hazards").await, 1);

    let hazards = h.engine.hazards(true).await.unwrap();
    assert_eq!(hazards.len(), 1);
    assert_eq!(hazards[0].report.id, report.id);
    assert!(h.engine.resolve_hazard(report.id).await.unwrap());
    assert!(!h.engine.resolve_hazard(report.id).await.unwrap());
    assert!(h.engine.hazards(true).await.unwrap().is_empty());
    assert_eq!(h.engine.hazards(false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn gateway_failure_before_any_mutation_is_not_a_hazard() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    h.wallets
        .fail_next_apply(wallet, GatewayError::Unavailable("maintenance".to_string()));

    let err = h
        .engine
        .create_transaction(CreateTransactionCmd::new(wallet, food, 200, Utc::now()))
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::ExternalUnavailable);
    assert!(err.hazard().is_none());
    assert_eq!(h.wallets.balance(wallet), 1_000);
    assert_eq!(h.count("transactions").await, 0);
    assert_eq!(h.count("saga_hazards").await, 0);
}

#[tokio::test]
async fn version_conflict_restarts_the_operation() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    h.wallets.race_next_applies(1);

    h.engine
        .create_transaction(CreateTransactionCmd::new(wallet, food, 200, Utc::now()))
        .await
        .unwrap();

    assert_eq!(h.wallets.apply_calls(), 2);
    assert_eq!(h.wallets.balance(wallet), 800);
    assert_eq!(h.count("transactions").await, 1);
}

#[tokio::test]
async fn version_conflicts_give_up_after_the_retry_budget() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    let attempts = h.engine.settings().max_conflict_retries as usize + 1;
    h.wallets.race_next_applies(attempts);

    let err = h
        .engine
        .create_transaction(CreateTransactionCmd::new(wallet, food, 200, Utc::now()))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::WalletConflict(id) if id == wallet));
    assert_eq!(err.class(), ErrorClass::ExternalUnavailable);
    assert_eq!(h.wallets.apply_calls(), attempts);
    assert_eq!(h.wallets.balance(wallet), 1_000);
    assert_eq!(h.count("saga_hazards").await, 0);
}

#[tokio::test]
async fn create_then_delete_restores_the_balance() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;

    let view = h
        .engine
        .create_transaction(CreateTransactionCmd::new(wallet, food, 200, Utc::now()))
        .await
        .unwrap();
    assert_eq!(h.wallets.balance(wallet), 800);

    let deleted = h.engine.delete_transaction(view.id).await.unwrap();

    assert_eq!(deleted.id, view.id);
    assert_eq!(h.wallets.balance(wallet), 1_000);
    assert_eq!(h.count("transactions").await, 0);
    assert_eq!(
        h.scalar(&format!(
            "SELECT COUNT(*) AS n FROM outbox_messages \
             WHERE aggregate_id = '{}' AND event_type = 'transaction.deleted'",
            view.id
        ))
        .await,
        1
    );
    assert!(matches!(
        h.engine.transaction(view.id).await,
        Err(EngineError::TransactionNotFound(_))
    ));
}

#[tokio::test]
async fn deleting_income_debits_it_back() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let salary = h.root_category("Salary", CategoryType::Income).await;

    let view = h
        .engine
        .create_transaction(CreateTransactionCmd::new(wallet, salary, 300, Utc::now()))
        .await
        .unwrap();
    assert_eq!(h.wallets.balance(wallet), 1_300);

    h.engine.delete_transaction(view.id).await.unwrap();

    assert_eq!(h.wallets.balance(wallet), 1_000);
}

#[tokio::test]
async fn attachments_are_uploaded_with_the_transaction() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;

    let view = h
        .engine
        .create_transaction(
            CreateTransactionCmd::new(wallet, food, 200, Utc::now())
                .attachment(AttachmentGroup::new(vec![png_base64(), png_base64()])),
        )
        .await
        .unwrap();

    assert_eq!(view.attachments.len(), 2);
    assert!(view.attachments.iter().all(|a| a.format == "png"));
    assert_eq!(h.objects.uploads().len(), 2);
    assert!(h.objects.uploads()[0].contains(&format!("transaction_attachment_{}", view.id)));

    let stored = h.engine.transaction(view.id).await.unwrap();
    assert_eq!(stored.attachments.len(), 2);
}

#[tokio::test]
async fn bad_attachment_payload_is_rejected_before_the_wallet() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;

    let err = h
        .engine
        .create_transaction(
            CreateTransactionCmd::new(wallet, food, 200, Utc::now())
                .attachment(AttachmentGroup::new(vec!["bm90IGFuIGltYWdl".to_string()])),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidAttachment(_)));
    assert_eq!(h.wallets.fetch_calls(), 0);
    assert!(h.objects.uploads().is_empty());
}

#[tokio::test]
async fn storage_outage_after_apply_is_a_hazard() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    h.objects.go_down();

    let err = h
        .engine
        .create_transaction(
            CreateTransactionCmd::new(wallet, food, 200, Utc::now())
                .attachment(AttachmentGroup::new(vec![png_base64()])),
        )
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::PartialCommitHazard);
    assert_eq!(h.wallets.balance(wallet), 800);
    assert_eq!(h.count("transactions").await, 0);
    assert_eq!(h.count("attachments").await, 0);
}

#[tokio::test]
async fn listing_pages_newest_first_and_filters_by_wallet() {
    let h = Harness::new().await;
    let cash = h.wallets.add_wallet("Cash", 10_000);
    let bank = h.wallets.add_wallet("Bank", 10_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    let base = Utc::now();

    let mut ids = Vec::new();
    for day in 0..3 {
        let view = h
            .engine
            .create_transaction(CreateTransactionCmd::new(
                cash,
                food,
                10 + day,
                base - chrono::Duration::days(day),
            ))
            .await
            .unwrap();
        ids.push(view.id);
    }
    h.engine
        .create_transaction(CreateTransactionCmd::new(bank, food, 99, base))
        .await
        .unwrap();

    let filter = TransactionListFilter {
        wallet_ids: vec![cash],
        ..TransactionListFilter::default()
    };
    let (first, cursor) = h
        .engine
        .list_transactions_page(2, None, &filter)
        .await
        .unwrap();
    assert_eq!(
        first.iter().map(|tx| tx.id).collect::<Vec<_>>(),
        ids[..2].to_vec()
    );
    let cursor = cursor.unwrap();

    let (second, cursor) = h
        .engine
        .list_transactions_page(2, Some(&cursor), &filter)
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, ids[2]);
    assert!(cursor.is_none());

    let (all, _) = h
        .engine
        .list_transactions_page(10, None, &TransactionListFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);

    assert!(matches!(
        h.engine
            .list_transactions_page(10, Some("garbage"), &filter)
            .await,
        Err(EngineError::InvalidCursor(_))
    ));
}

#[tokio::test]
async fn balance_overflow_is_rejected_before_apply() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Bank", 1);
    let salary = h.root_category("Salary", CategoryType::Income).await;

    let err = h
        .engine
        .create_transaction(CreateTransactionCmd::new(
            wallet,
            salary,
            i64::MAX,
            Utc::now(),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidAmount(_)));
    assert_eq!(h.wallets.apply_calls(), 0);
    assert_eq!(h.wallets.balance(wallet), 1);
    assert_eq!(h.count("transactions").await, 0);
    assert_eq!(h.count("saga_hazards").await, 0);
}

#[tokio::test]
async fn commit_failure_after_apply_is_a_hazard() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    h.break_commit().await;

    let err = h
        .engine
        .create_transaction(CreateTransactionCmd::new(wallet, food, 200, Utc::now()))
        .await
        .unwrap_err();

    let report = err.hazard().unwrap();
    assert!(matches!(report.cause, HazardCause::CommitFailed(_)));
    assert_eq!(report.mutations.len(), 1);
    assert_eq!(report.mutations[0].wallet_id, wallet);
    assert_eq!(h.wallets.balance(wallet), 800);
    assert_eq!(h.count("transactions").await, 0);
    assert_eq!(h.count("outbox_messages").await, 0);
    assert_eq!(h.count("saga_hazards").await, 1);
}

#[tokio::test]
async fn cancelled_create_after_apply_is_recorded_as_a_hazard() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    h.objects.stall_uploads(Duration::from_secs(5));

    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        h.engine.create_transaction(
            CreateTransactionCmd::new(wallet, food, 200, Utc::now())
                .attachment(AttachmentGroup::new(vec![png_base64()])),
        ),
    )
    .await;
    assert!(outcome.is_err());

    let mut hazards = Vec::new();
    for _ in 0..100 {
        hazards = h.engine.hazards(true).await.unwrap();
        if !hazards.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(hazards.len(), 1);
    let report = &hazards[0].report;
    assert_eq!(report.cause, HazardCause::Cancelled);
    assert_eq!(report.mutations.len(), 1);
    assert_eq!(report.mutations[0].wallet_id, wallet);
    assert_eq!(report.mutations[0].compensation_minor(), 200);
    assert_eq!(h.wallets.balance(wallet), 800);
    assert_eq!(h.count("transactions").await, 0);
    assert_eq!(h.count("outbox_messages").await, 0);
}

#[tokio::test]
async fn replay_with_a_different_command_is_a_conflict() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Cash", 1_000);
    let food = h.root_category("Food", CategoryType::Expense).await;
    h.engine
        .create_transaction(
            CreateTransactionCmd::new(wallet, food, 200, Utc::now()).idempotency_key("req-1"),
        )
        .await
        .unwrap();

    let err = h
        .engine
        .create_transaction(
            CreateTransactionCmd::new(wallet, food, 300, Utc::now()).idempotency_key("req-1"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::IdempotencyConflict(key) if key == "req-1"));
    assert_eq!(h.wallets.apply_calls(), 1);
    assert_eq!(h.wallets.balance(wallet), 800);
}

#[tokio::test]
async fn inverted_date_range_is_a_validation_error() {
    let h = Harness::new().await;
    let now = Utc::now();
    let filter = TransactionListFilter {
        from: Some(now),
        to: Some(now - chrono::Duration::days(1)),
        ..TransactionListFilter::default()
    };

    let err = h
        .engine
        .list_transactions_page(10, None, &filter)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidRange(_)));
    assert_eq!(err.class(), ErrorClass::Validation);
}
