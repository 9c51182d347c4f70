//! Integration Test: Engine entry points
//!
//! Payment-success trigger, background worker, login sync and admin
//! operations through [`CommissionEngine`].

mod helpers;

use commission_engine::*;
use helpers::{amount, Fixture};
use rust_decimal::Decimal;

#[tokio::test]
async fn test_payment_trigger_creates_commission() {
    let fx = Fixture::new();
    let agent = fx.user("Ana Agent", UserRole::Agent).await;
    let operator = fx.user("Omar Operator", UserRole::Operator).await;
    let shop = fx.shop("Tidewater Deli", Some(agent), Some(operator)).await;
    let payment = fx.payment(shop, amount(1000)).await;

    let engine = CommissionEngine::start(fx.dyn_store(), EngineConfig::default());
    engine.on_payment_succeeded(payment, shop);
    assert_eq!(engine.trigger_stats(), (1, 0));

    let handled = engine.shutdown().await;
    assert_eq!(handled, 1);

    let c = fx.commission(payment).await;
    assert_eq!(c.agent_amount, amount(200));
    assert_eq!(c.operator_amount, amount(80));
    assert_eq!(c.company_amount, amount(720));
}

#[tokio::test]
async fn test_duplicate_notifications_stay_idempotent() {
    let fx = Fixture::new();
    let shop = fx.shop("Tidewater Deli", None, None).await;
    let payment = fx.payment(shop, amount(40)).await;

    let engine = CommissionEngine::start(fx.dyn_store(), EngineConfig::default());
    for _ in 0..3 {
        engine.on_payment_succeeded(payment, shop);
    }
    assert_eq!(engine.shutdown().await, 3);
    assert_eq!(fx.store.commission_count().await, 1);
}

#[tokio::test]
async fn test_failed_job_does_not_stop_worker() {
    let fx = Fixture::new();
    let shop = fx.shop("Tidewater Deli", None, None).await;
    let pending = fx.payment(shop, amount(75)).await;
    fx.store.set_payment_status(pending, PaymentStatus::Pending).await;
    let settled = fx.payment(shop, amount(75)).await;

    let engine = CommissionEngine::start(fx.dyn_store(), EngineConfig::default());
    engine.on_payment_succeeded(pending, shop);
    engine.on_payment_succeeded(settled, shop);
    assert_eq!(engine.shutdown().await, 2);

    assert!(fx.store.find_commission(pending).await.unwrap().is_none());
    assert_eq!(fx.commission(settled).await.company_amount, amount(75));
}

#[tokio::test]
async fn test_sweep_repairs_missed_trigger() {
    let fx = Fixture::new();
    let agent = fx.user("Ana Agent", UserRole::Agent).await;
    let shop = fx.shop("Tidewater Deli", Some(agent), None).await;
    let notified = fx.payment(shop, amount(500)).await;
    let missed = fx.payment(shop, amount(500)).await;

    let engine = CommissionEngine::start(fx.dyn_store(), EngineConfig::default());
    engine.on_payment_succeeded(notified, shop);

    let report = engine.run_sweep().await.unwrap();
    assert_eq!(report.errors, 0);
    assert_eq!(report.processed(), 2);

    engine.shutdown().await;
    assert_eq!(fx.store.commission_count().await, 2);
    assert_eq!(fx.commission(missed).await.agent_amount, amount(100));
}

#[tokio::test]
async fn test_login_sync_backfills_operator() {
    let fx = Fixture::new();
    let agent = fx.user("Ana Agent", UserRole::Agent).await;
    let operator = fx.user("Omar Operator", UserRole::Operator).await;
    let shop = fx.shop("Tidewater Deli", Some(agent), None).await;
    let payment = fx.payment(shop, amount(1000)).await;

    let engine = CommissionEngine::start(fx.dyn_store(), EngineConfig::default());
    engine.run_sweep().await.unwrap();
    assert_eq!(fx.commission(payment).await.operator_amount, Decimal::ZERO);

    fx.approve(agent, operator, 0).await;
    engine.on_user_login(operator).await.unwrap();

    let c = fx.commission(payment).await;
    assert_eq!(c.operator_id, Some(operator));
    assert_eq!(c.operator_amount, amount(80));
    assert_eq!(c.company_amount, amount(720));

    let earnings = engine.user_earnings(operator).await.unwrap();
    assert_eq!(earnings.as_operator, amount(80));
    assert_eq!(earnings.pending, amount(80));
    engine.shutdown().await;
}

#[tokio::test]
async fn test_login_for_unknown_user_is_harmless() {
    let fx = Fixture::new();
    let engine = CommissionEngine::start(fx.dyn_store(), EngineConfig::default());

    engine.on_user_login(uuid::Uuid::new_v4()).await.unwrap();
    let report = engine.sync_user(uuid::Uuid::new_v4()).await.unwrap();
    assert_eq!(report.processed(), 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_mark_paid_freezes_commission() {
    let fx = Fixture::new();
    let agent = fx.user("Ana Agent", UserRole::Agent).await;
    let operator = fx.user("Omar Operator", UserRole::Operator).await;
    let shop = fx.shop("Tidewater Deli", Some(agent), None).await;
    let payment = fx.payment(shop, amount(1000)).await;

    let engine = CommissionEngine::start(fx.dyn_store(), EngineConfig::default());
    engine.run_sweep().await.unwrap();
    let paid = engine.mark_paid(payment).await.unwrap();
    assert_eq!(paid.status, CommissionStatus::Paid);

    // Operator discovered after payout: ledger keeps what was paid
    fx.approve(agent, operator, 0).await;
    let report = engine.run_sweep().await.unwrap();
    assert_eq!(report.skipped, 1);

    let c = fx.commission(payment).await;
    assert_eq!(c.operator_id, None);
    assert_eq!(c.company_amount, amount(800));

    let totals = engine.totals().await.unwrap();
    assert_eq!(totals.paid_count, 1);
    assert_eq!(totals.pending_count, 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_invalidate_shop_picks_up_new_referral() {
    let fx = Fixture::new();
    let agent = fx.user("Ana Agent", UserRole::Agent).await;
    let old_operator = fx.user("Omar Operator", UserRole::Operator).await;
    let new_operator = fx.user("Pia Operator", UserRole::Operator).await;
    let shop = fx.shop("Tidewater Deli", Some(agent), Some(old_operator)).await;
    let request = fx.approve(agent, new_operator, 0).await;

    let engine = CommissionEngine::start(fx.dyn_store(), EngineConfig::default());
    engine.invalidate_shop(shop).await.unwrap();
    let payment = fx.payment(shop, amount(100)).await;
    engine.run_sweep().await.unwrap();

    assert_eq!(fx.commission(payment).await.operator_id, Some(new_operator));
    let cached = fx.store.load_shop(shop).await.unwrap().unwrap();
    assert_eq!(cached.operator_id, Some(new_operator));

    // Rejected referrals are ignored after the next invalidation
    fx.store.set_referral_status(request, ReferralStatus::Rejected).await;
    engine.invalidate_shop(shop).await.unwrap();
    let later = fx.payment(shop, amount(100)).await;
    engine.run_sweep().await.unwrap();
    assert_eq!(fx.commission(later).await.operator_id, None);
    engine.shutdown().await;
}
