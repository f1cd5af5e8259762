use chrono::Utc;
use engine::{
    CreateOutcome, CreateRequest, EngineError, ErrorClass, FundTransferCmd, GatewayError,
    HazardCause, TransactionListFilter, TransferLeg, UpdateTransactionCmd,
};

mod common;

use common::Harness;

#[tokio::test]
async fn transfer_moves_amount_and_charges_fee_to_source() {
    let h = Harness::new().await;
    let from = h.wallets.add_wallet("Bank", 1_000);
    let to = h.wallets.add_wallet("Cash", 0);
    let (cash_out, cash_in) = h.transfer_categories().await;

    let view = h
        .engine
        .fund_transfer(
            FundTransferCmd::new(from, to, 300, cash_out, cash_in, Utc::now()).admin_fee(10),
        )
        .await
        .unwrap();

    assert_eq!(h.wallets.balance(from), 690);
    assert_eq!(h.wallets.balance(to), 300);
    assert_eq!(view.amount_minor, 300);
    assert_eq!(view.admin_fee_minor, 10);
    assert_eq!(view.cash_out.amount_minor, 310);
    assert_eq!(view.cash_out.transfer_leg, Some(TransferLeg::CashOut));
    assert_eq!(view.cash_in.transfer_leg, Some(TransferLeg::CashIn));
    assert_eq!(view.cash_out.transfer_id, Some(view.transfer_id));
    assert_eq!(view.cash_in.transfer_id, Some(view.transfer_id));
    assert_eq!(view.cash_out.description, "fund transfer to Cash");
    assert_eq!(view.cash_in.description, "fund transfer from Bank");

    assert_eq!(h.count("transactions").await, 2);
    assert_eq!(
        h.scalar(
            "SELECT COUNT(*) AS n FROM outbox_messages \
             WHERE event_type = 'transaction.created'"
        )
        .await,
        2
    );

    let stored = h.engine.transfer_view(view.transfer_id).await.unwrap();
    assert_eq!(stored.cash_out.id, view.cash_out.id);
    assert_eq!(stored.cash_in.id, view.cash_in.id);
}

#[tokio::test]
async fn same_wallet_is_rejected_before_any_gateway_call() {
    let h = Harness::new().await;
    let wallet = h.wallets.add_wallet("Bank", 1_000);
    let (cash_out, cash_in) = h.transfer_categories().await;

    let err = h
        .engine
        .fund_transfer(FundTransferCmd::new(
            wallet,
            wallet,
            300,
            cash_out,
            cash_in,
            Utc::now(),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::SameWallet));
    assert_eq!(h.wallets.fetch_calls(), 0);
    assert_eq!(h.wallets.apply_calls(), 0);
}

#[tokio::test]
async fn source_must_cover_amount_plus_fee() {
    let h = Harness::new().await;
    let from = h.wallets.add_wallet("Bank", 300);
    let to = h.wallets.add_wallet("Cash", 0);
    let (cash_out, cash_in) = h.transfer_categories().await;

    let err = h
        .engine
        .fund_transfer(
            FundTransferCmd::new(from, to, 300, cash_out, cash_in, Utc::now()).admin_fee(1),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(h.wallets.apply_calls(), 0);
    assert_eq!(h.count("transactions").await, 0);
}

#[tokio::test]
async fn negative_fee_is_invalid() {
    let h = Harness::new().await;
    let from = h.wallets.add_wallet("Bank", 300);
    let to = h.wallets.add_wallet("Cash", 0);
    let (cash_out, cash_in) = h.transfer_categories().await;

    let err = h
        .engine
        .fund_transfer(
            FundTransferCmd::new(from, to, 100, cash_out, cash_in, Utc::now()).admin_fee(-1),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidAmount(_)));
    assert_eq!(h.wallets.fetch_calls(), 0);
}

#[tokio::test]
async fn replayed_transfer_returns_the_stored_legs() {
    let h = Harness::new().await;
    let from = h.wallets.add_wallet("Bank", 1_000);
    let to = h.wallets.add_wallet("Cash", 0);
    let (cash_out, cash_in) = h.transfer_categories().await;
    let cmd = FundTransferCmd::new(from, to, 100, cash_out, cash_in, Utc::now())
        .idempotency_key("transfer-1");

    let first = h
        .engine
        .create(CreateRequest::Transfer(cmd.clone()))
        .await
        .unwrap();
    let second = h.engine.create(CreateRequest::Transfer(cmd)).await.unwrap();

    let (CreateOutcome::Transfer(first), CreateOutcome::Transfer(second)) = (first, second) else {
        panic!("expected transfer outcomes");
    };
    assert_eq!(first.transfer_id, second.transfer_id);
    assert_eq!(h.wallets.apply_calls(), 2);
    assert_eq!(h.wallets.balance(from), 900);
    assert_eq!(h.wallets.balance(to), 100);
    assert_eq!(h.count("transactions").await, 2);
}

#[tokio::test]
async fn replay_with_a_different_amount_is_a_conflict() {
    let h = Harness::new().await;
    let from = h.wallets.add_wallet("Bank", 1_000);
    let to = h.wallets.add_wallet("Cash", 0);
    let (cash_out, cash_in) = h.transfer_categories().await;
    let cmd = FundTransferCmd::new(from, to, 100, cash_out, cash_in, Utc::now())
        .idempotency_key("transfer-1");
    h.engine.fund_transfer(cmd.clone()).await.unwrap();

    let err = h
        .engine
        .fund_transfer(cmd.admin_fee(5))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::IdempotencyConflict(key) if key == "transfer-1"));
    assert_eq!(h.wallets.apply_calls(), 2);
    assert_eq!(h.wallets.balance(from), 900);
}

#[tokio::test]
async fn second_leg_failure_reports_the_first_mutation() {
    let h = Harness::new().await;
    let from = h.wallets.add_wallet("Bank", 1_000);
    let to = h.wallets.add_wallet("Cash", 0);
    let (cash_out, cash_in) = h.transfer_categories().await;
    h.wallets
        .fail_next_apply(to, GatewayError::Rejected("wallet frozen".to_string()));

    let err = h
        .engine
        .fund_transfer(FundTransferCmd::new(from, to, 100, cash_out, cash_in, Utc::now()))
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::PartialCommitHazard);
    let report = err.hazard().unwrap();
    assert!(matches!(report.cause, HazardCause::WalletCallFailed(_)));
    assert_eq!(report.mutations.len(), 1);
    assert_eq!(report.mutations[0].wallet_id, from);
    assert_eq!(h.wallets.balance(from), 900);
    assert_eq!(h.wallets.balance(to), 0);
    assert_eq!(h.count("transactions").await, 0);
    assert_eq!(h.count("saga_hazards").await, 1);
}

#[tokio::test]
async fn deleting_a_leg_reverts_its_own_direction() {
    let h = Harness::new().await;
    let from = h.wallets.add_wallet("Bank", 1_000);
    let to = h.wallets.add_wallet("Cash", 0);
    let (cash_out, cash_in) = h.transfer_categories().await;
    let view = h
        .engine
        .fund_transfer(
            FundTransferCmd::new(from, to, 300, cash_out, cash_in, Utc::now()).admin_fee(10),
        )
        .await
        .unwrap();

    h.engine.delete_transaction(view.cash_out.id).await.unwrap();
    assert_eq!(h.wallets.balance(from), 1_000);

    h.engine.delete_transaction(view.cash_in.id).await.unwrap();
    assert_eq!(h.wallets.balance(to), 0);
}

#[tokio::test]
async fn legs_keep_wallet_category_and_amount() {
    let h = Harness::new().await;
    let from = h.wallets.add_wallet("Bank", 1_000);
    let to = h.wallets.add_wallet("Cash", 0);
    let (cash_out, cash_in) = h.transfer_categories().await;
    let view = h
        .engine
        .fund_transfer(FundTransferCmd::new(from, to, 300, cash_out, cash_in, Utc::now()))
        .await
        .unwrap();
    let applied = h.wallets.apply_calls();

    let err = h
        .engine
        .update_transaction(view.cash_in.id, UpdateTransactionCmd::new().amount_minor(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidCategoryType(_)));
    assert_eq!(h.wallets.apply_calls(), applied);

    let renamed = h
        .engine
        .update_transaction(
            view.cash_in.id,
            UpdateTransactionCmd::new().description("pocket money"),
        )
        .await
        .unwrap();
    assert_eq!(renamed.description, "pocket money");
    assert_eq!(h.wallets.apply_calls(), applied);
}

#[tokio::test]
async fn wallet_listing_includes_transfer_legs() {
    let h = Harness::new().await;
    let from = h.wallets.add_wallet("Bank", 1_000);
    let to = h.wallets.add_wallet("Cash", 0);
    let (cash_out, cash_in) = h.transfer_categories().await;
    let view = h
        .engine
        .fund_transfer(FundTransferCmd::new(from, to, 100, cash_out, cash_in, Utc::now()))
        .await
        .unwrap();

    let filter = TransactionListFilter {
        wallet_ids: vec![to],
        ..TransactionListFilter::default()
    };
    let (rows, cursor) = h
        .engine
        .list_transactions_page(10, None, &filter)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, view.cash_in.id);
    assert_eq!(rows[0].transfer_leg, Some(TransferLeg::CashIn));
    assert!(cursor.is_none());

    let (all, _) = h
        .engine
        .list_transactions_page(10, None, &TransactionListFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}
