mod common;

use studiobook::error::AppError;
use uuid::Uuid;

use common::{create_package_type, days_ago, grant_package, setup};

#[tokio::test]
async fn grant_computes_expiry_from_purchase_time() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let package_type = create_package_type(&app, 10, 30, "yoga").await?;

    let purchased_at = days_ago(5);
    let package = app
        .ctx
        .ledger
        .grant(customer, package_type.id, purchased_at)
        .await?;

    assert_eq!(package.total_credits, 10);
    assert_eq!(package.remaining_credits, 10);
    assert_eq!(package.expires_at, purchased_at + chrono::Duration::days(30));
    Ok(())
}

#[tokio::test]
async fn deduct_and_refund_stay_within_bounds() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let package = grant_package(&app, customer, 2, "yoga").await?;

    app.ctx.ledger.deduct(package.id, 1).await?;
    app.ctx.ledger.deduct(package.id, 1).await?;

    let depleted = app.ctx.package_repo.find_by_id(package.id).await?.unwrap();
    assert_eq!(depleted.remaining_credits, 0);
    assert_eq!(
        depleted.status,
        studiobook::domain::PackageStatus::Depleted
    );

    // Third deduction has nothing left to take.
    let err = app.ctx.ledger.deduct(package.id, 1).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientCredits));

    // Refunds walk it back up, but never past total.
    app.ctx.ledger.refund(package.id, 1).await?;
    app.ctx.ledger.refund(package.id, 1).await?;
    let full = app.ctx.package_repo.find_by_id(package.id).await?.unwrap();
    assert_eq!(full.remaining_credits, 2);
    assert_eq!(full.status, studiobook::domain::PackageStatus::Active);

    let err = app.ctx.ledger.refund(package.id, 1).await.unwrap_err();
    assert!(matches!(err, AppError::WouldExceedTotal));
    Ok(())
}

#[tokio::test]
async fn expiry_is_authoritative_at_use_time() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let package_type = create_package_type(&app, 5, 30, "yoga").await?;

    // Purchased 31 days ago with 30-day validity: expired, even though the
    // status column still says Active (no sweep has run).
    let package = app
        .ctx
        .ledger
        .grant(customer, package_type.id, days_ago(31))
        .await?;
    assert_eq!(package.status, studiobook::domain::PackageStatus::Active);

    let err = app.ctx.ledger.deduct(package.id, 1).await.unwrap_err();
    assert!(matches!(err, AppError::PackageNotActive(_)));

    // The sweep flips the advisory status without touching credits.
    let flipped = app.ctx.ledger.expire_sweep().await?;
    assert_eq!(flipped, 1);
    let swept = app.ctx.package_repo.find_by_id(package.id).await?.unwrap();
    assert_eq!(swept.status, studiobook::domain::PackageStatus::Expired);
    assert_eq!(swept.remaining_credits, 5);
    Ok(())
}

#[tokio::test]
async fn concurrent_deductions_for_last_credit_pick_one_winner() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let package = grant_package(&app, customer, 1, "yoga").await?;

    let ledger_a = app.ctx.ledger.clone();
    let ledger_b = app.ctx.ledger.clone();
    let (first, second) = tokio::join!(
        ledger_a.deduct(package.id, 1),
        ledger_b.deduct(package.id, 1)
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one deduction may win the last credit");

    let failure = if first.is_err() { first } else { second };
    assert!(matches!(
        failure.unwrap_err(),
        AppError::InsufficientCredits
    ));

    let after = app.ctx.package_repo.find_by_id(package.id).await?.unwrap();
    assert_eq!(after.remaining_credits, 0);
    Ok(())
}
