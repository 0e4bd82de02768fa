mod common;

use anyhow::Result;
use common::{parse_date, test_engine, test_engine_with, two_customers, Customer};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tellerline::application::{AppError, EngineConfig, TransferEngine};
use tokio::task::JoinSet;

/// Fire `count` identical transfers at once and collect every outcome.
async fn race_transfers(
    engine: &TransferEngine,
    sender: &Customer,
    receiver: &Customer,
    amount: Decimal,
    count: usize,
) -> Vec<Result<uuid::Uuid, AppError>> {
    let day = parse_date("2024-06-03");
    let mut set = JoinSet::new();
    for _ in 0..count {
        let engine = engine.clone();
        let requester = sender.id;
        let source = sender.number().to_string();
        let target = receiver.number().to_string();
        set.spawn(async move {
            engine
                .transfer_at(requester, &source, &target, amount, None, day)
                .await
        });
    }

    let mut outcomes = Vec::with_capacity(count);
    while let Some(joined) = set.join_next().await {
        outcomes.push(joined.expect("transfer task panicked"));
    }
    outcomes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_transfers_never_overdraw() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(1000.00), dec!(0)).await?;

    let outcomes = race_transfers(&engine, &alice, &bob, dec!(100.00), 25).await;

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let insufficient = outcomes
        .iter()
        .filter(|r| matches!(r, Err(AppError::InsufficientFunds { .. })))
        .count();
    assert_eq!(successes, 10);
    assert_eq!(insufficient, 15);

    assert_eq!(alice.balance(&engine).await?, dec!(0));
    assert_eq!(bob.balance(&engine).await?, dec!(1000.00));

    let day = parse_date("2024-06-03");
    let view = engine.get_balance_at(alice.id, alice.number(), day).await?;
    assert_eq!(view.daily_used_today, dec!(1000.00));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_transfers_respect_daily_limit() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let (alice, bob) = two_customers(&engine, dec!(200000.00), dec!(0)).await?;

    let outcomes = race_transfers(&engine, &alice, &bob, dec!(10000.00), 8).await;

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let limited = outcomes
        .iter()
        .filter(|r| matches!(r, Err(AppError::DailyLimitExceeded { .. })))
        .count();
    assert_eq!(successes, 5);
    assert_eq!(limited, 3);

    assert_eq!(alice.balance(&engine).await?, dec!(150000.00));
    assert_eq!(bob.balance(&engine).await?, dec!(50000.00));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_transfers_in_both_directions_conserve_money() -> Result<()> {
    let config = EngineConfig::default().with_daily_limit(10_000_000);
    let (engine, _temp) = test_engine_with(config).await?;
    let (alice, bob) = two_customers(&engine, dec!(500.00), dec!(500.00)).await?;

    let day = parse_date("2024-06-03");
    let mut set = JoinSet::new();
    for i in 0..20 {
        let engine = engine.clone();
        let (from, to) = if i % 2 == 0 { (&alice, &bob) } else { (&bob, &alice) };
        let requester = from.id;
        let source = from.number().to_string();
        let target = to.number().to_string();
        set.spawn(async move {
            engine
                .transfer_at(requester, &source, &target, dec!(37.50), None, day)
                .await
        });
    }
    while let Some(joined) = set.join_next().await {
        joined.expect("transfer task panicked")?;
    }

    let total = alice.balance(&engine).await? + bob.balance(&engine).await?;
    assert_eq!(total, dec!(1000.00));
    assert_eq!(alice.balance(&engine).await?, dec!(500.00));

    let report = engine.check_integrity().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    Ok(())
}
