mod common;

use anyhow::Result;
use common::{two_customers, Customer, test_engine};
use rust_decimal_macros::dec;
use tellerline::application::AppError;
use tellerline::domain::{TransactionStatus, TransactionType};

#[tokio::test]
async fn test_successful_transfer_moves_money() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(1000.00), dec!(50.00)).await?;

    let txn_id = engine
        .transfer(
            alice.id,
            alice.number(),
            bob.number(),
            dec!(250.00),
            Some("Rent share".to_string()),
        )
        .await?;

    assert_eq!(alice.balance(&engine).await?, dec!(750.00));
    assert_eq!(bob.balance(&engine).await?, dec!(300.00));

    let txn = engine.repository().get_transaction(txn_id).await?.unwrap();
    assert_eq!(txn.amount_cents, 25_000);
    assert_eq!(txn.transaction_type, TransactionType::Transfer);
    assert_eq!(txn.status, TransactionStatus::Success);
    assert_eq!(txn.source_account, alice.account.id);
    assert_eq!(txn.target_account, bob.account.id);
    assert_eq!(txn.description.as_deref(), Some("Rent share"));

    Ok(())
}

#[tokio::test]
async fn test_transfer_updates_sender_daily_usage_only() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(1000.00), dec!(0)).await?;

    engine
        .transfer(alice.id, alice.number(), bob.number(), dec!(120.50), None)
        .await?;

    let sender = engine.get_balance(alice.id, alice.number()).await?;
    assert_eq!(sender.daily_used_today, dec!(120.50));
    assert_eq!(sender.daily_limit, dec!(50000.00));

    let receiver = engine.get_balance(bob.id, bob.number()).await?;
    assert_eq!(receiver.daily_used_today, dec!(0));
    assert_eq!(receiver.balance, dec!(120.50));

    Ok(())
}

#[tokio::test]
async fn test_amount_is_rounded_half_up() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(100.00), dec!(0)).await?;

    let txn_id = engine
        .transfer(alice.id, alice.number(), bob.number(), dec!(10.005), None)
        .await?;

    let txn = engine.repository().get_transaction(txn_id).await?.unwrap();
    assert_eq!(txn.amount_cents, 1_001);
    assert_eq!(alice.balance(&engine).await?, dec!(89.99));
    assert_eq!(bob.balance(&engine).await?, dec!(10.01));

    Ok(())
}

#[tokio::test]
async fn test_transfer_of_entire_balance() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(42.42), dec!(0)).await?;

    engine
        .transfer(alice.id, alice.number(), bob.number(), dec!(42.42), None)
        .await?;

    assert_eq!(alice.balance(&engine).await?, dec!(0));
    assert_eq!(bob.balance(&engine).await?, dec!(42.42));
    Ok(())
}

#[tokio::test]
async fn test_invalid_amounts_are_rejected() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(100.00), dec!(0)).await?;

    for amount in [dec!(0), dec!(-5.00), dec!(0.004)] {
        let err = engine
            .transfer(alice.id, alice.number(), bob.number(), amount, None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::InvalidAmount(_)),
            "amount {} gave {:?}",
            amount,
            err
        );
    }

    assert_eq!(alice.balance(&engine).await?, dec!(100.00));
    Ok(())
}

#[tokio::test]
async fn test_same_account_transfer_is_rejected() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let alice = Customer::open(&engine, dec!(100.00)).await?;

    let err = engine
        .transfer(alice.id, alice.number(), alice.number(), dec!(10.00), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::SameAccount));
    assert_eq!(alice.balance(&engine).await?, dec!(100.00));
    Ok(())
}

#[tokio::test]
async fn test_same_account_check_comes_after_lookup_and_ownership() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(100.00), dec!(0)).await?;

    let err = engine
        .transfer(alice.id, "0000000000000000", "0000000000000000", dec!(1.00), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(_)));

    let err = engine
        .transfer(bob.id, alice.number(), alice.number(), dec!(1.00), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    assert_eq!(alice.balance(&engine).await?, dec!(100.00));
    Ok(())
}

#[tokio::test]
async fn test_unknown_accounts_are_rejected() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let alice = Customer::open(&engine, dec!(100.00)).await?;

    let err = engine
        .transfer(alice.id, alice.number(), "0000000000000000", dec!(10.00), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(ref n) if n == "0000000000000000"));

    let err = engine
        .transfer(alice.id, "9999999999999999", alice.number(), dec!(10.00), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(_)));

    assert_eq!(alice.balance(&engine).await?, dec!(100.00));
    Ok(())
}

#[tokio::test]
async fn test_non_owner_cannot_transfer() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(100.00), dec!(100.00)).await?;

    // Bob tries to pull money out of Alice's account.
    let err = engine
        .transfer(bob.id, alice.number(), bob.number(), dec!(10.00), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(alice.balance(&engine).await?, dec!(100.00));
    assert_eq!(bob.balance(&engine).await?, dec!(100.00));

    // Nothing was counted against Alice's daily limit either.
    let tracker = engine
        .repository()
        .find_tracker(alice.account.id, chrono::Utc::now().date_naive())
        .await?;
    assert!(tracker.is_none());
    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_leaves_state_untouched() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(99.99), dec!(0)).await?;

    let err = engine
        .transfer(alice.id, alice.number(), bob.number(), dec!(100.00), None)
        .await
        .unwrap_err();

    match err {
        AppError::InsufficientFunds {
            account_number,
            balance,
            required,
        } => {
            assert_eq!(account_number, alice.number());
            assert_eq!(balance, 9_999);
            assert_eq!(required, 10_000);
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }

    assert_eq!(alice.balance(&engine).await?, dec!(99.99));
    assert_eq!(bob.balance(&engine).await?, dec!(0));

    let view = engine.get_balance(alice.id, alice.number()).await?;
    assert_eq!(view.daily_used_today, dec!(0));

    // Only the opening deposit is on record.
    let history = engine.list_transactions(alice.id, alice.number(), None).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].transaction_type, TransactionType::Deposit);
    Ok(())
}

#[tokio::test]
async fn test_repeated_requests_are_not_deduplicated() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(100.00), dec!(0)).await?;

    let first = engine
        .transfer(alice.id, alice.number(), bob.number(), dec!(10.00), None)
        .await?;
    let second = engine
        .transfer(alice.id, alice.number(), bob.number(), dec!(10.00), None)
        .await?;

    assert_ne!(first, second);
    assert_eq!(alice.balance(&engine).await?, dec!(80.00));
    assert_eq!(bob.balance(&engine).await?, dec!(20.00));
    Ok(())
}
