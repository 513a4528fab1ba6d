mod common;

use chrono::Duration;
use studiobook::{
    domain::*,
    error::AppError,
    notify::Template,
    service::Applied,
};
use uuid::Uuid;

use common::{create_class, grant_package, setup, TestApp};

async fn confirmed_booking(
    app: &TestApp,
    customer: Uuid,
    class_id: Uuid,
) -> anyhow::Result<Booking> {
    let package = grant_package(app, customer, 5, "yoga").await?;
    let booking = app
        .ctx
        .booking_service
        .create(
            customer,
            class_id,
            FundingChoice::PackageCredit {
                package_id: package.id,
            },
        )
        .await?;
    Ok(booking)
}

#[tokio::test]
async fn credit_funded_booking_is_born_confirmed() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let package = grant_package(&app, customer, 5, "yoga").await?;

    let booking = app
        .ctx
        .booking_service
        .create(
            customer,
            class.id,
            FundingChoice::PackageCredit {
                package_id: package.id,
            },
        )
        .await?;

    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_status, PaymentStatus::Paid);
    assert_eq!(booking.package_id, Some(package.id));

    let after = app.ctx.package_repo.find_by_id(package.id).await?.unwrap();
    assert_eq!(after.remaining_credits, 4);

    assert!(app.sink.templates().contains(&Template::BookingConfirmed));
    Ok(())
}

#[tokio::test]
async fn single_payment_booking_waits_for_the_gateway() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&app, "yoga", "studio-a", 10, Duration::days(1)).await?;

    let booking = app
        .ctx
        .booking_service
        .create(customer, class.id, FundingChoice::SinglePayment)
        .await?;

    assert_eq!(booking.status, BookingStatus::PendingPayment);
    assert_eq!(booking.payment_status, PaymentStatus::Pending);
    assert!(booking.package_id.is_none());
    assert!(
        booking.external_payment_id.is_some(),
        "invoice hand-off records the order reference"
    );
    Ok(())
}

#[tokio::test]
async fn confirm_is_idempotent() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let booking = app
        .ctx
        .booking_service
        .create(customer, class.id, FundingChoice::SinglePayment)
        .await?;

    let first = app
        .ctx
        .booking_service
        .confirm(booking.id, "order-1")
        .await?;
    let second = app
        .ctx
        .booking_service
        .confirm(booking.id, "order-1")
        .await?;

    assert_eq!(first, Applied::Changed);
    assert_eq!(second, Applied::Unchanged);

    let after = app.ctx.booking_repo.find_by_id(booking.id).await?.unwrap();
    assert_eq!(after.status, BookingStatus::Confirmed);
    assert_eq!(after.payment_status, PaymentStatus::Paid);
    Ok(())
}

#[tokio::test]
async fn cancelling_credit_funded_booking_returns_exactly_one_credit() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let package = grant_package(&app, customer, 5, "yoga").await?;

    let booking = app
        .ctx
        .booking_service
        .create(
            customer,
            class.id,
            FundingChoice::PackageCredit {
                package_id: package.id,
            },
        )
        .await?;

    let outcome = app
        .ctx
        .booking_service
        .cancel(booking.id, "schedule conflict")
        .await?;
    assert_eq!(outcome.booking.status, BookingStatus::Cancelled);
    assert_eq!(outcome.seat_freed, Some(class.id));
    assert!(!outcome.requires_manual_refund);

    let after = app.ctx.package_repo.find_by_id(package.id).await?.unwrap();
    assert_eq!(after.remaining_credits, 5);

    // Cancelling again is a no-op: the credit comes back once, not twice.
    let repeat = app
        .ctx
        .booking_service
        .cancel(booking.id, "schedule conflict")
        .await?;
    assert!(repeat.seat_freed.is_none());
    let still = app.ctx.package_repo.find_by_id(package.id).await?.unwrap();
    assert_eq!(still.remaining_credits, 5);
    Ok(())
}

#[tokio::test]
async fn cancelling_paid_single_payment_flags_manual_refund() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let booking = app
        .ctx
        .booking_service
        .create(customer, class.id, FundingChoice::SinglePayment)
        .await?;
    app.ctx
        .booking_service
        .confirm(booking.id, "order-9")
        .await?;

    let outcome = app
        .ctx
        .booking_service
        .cancel(booking.id, "customer request")
        .await?;

    assert!(outcome.requires_manual_refund);
    assert!(outcome.booking.requires_manual_refund);
    Ok(())
}

#[tokio::test]
async fn terminal_bookings_refuse_further_transitions() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let package = grant_package(&app, customer, 5, "yoga").await?;
    let booking = app
        .ctx
        .booking_service
        .create(
            customer,
            class.id,
            FundingChoice::PackageCredit {
                package_id: package.id,
            },
        )
        .await?;
    app.ctx.booking_service.complete(booking.id).await?;

    let err = app
        .ctx
        .booking_service
        .cancel(booking.id, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    let err = app
        .ctx
        .booking_service
        .confirm(booking.id, "order-x")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    let after = app.ctx.booking_repo.find_by_id(booking.id).await?.unwrap();
    assert_eq!(after.status, BookingStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn expire_payment_never_touches_credits() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let booking = app
        .ctx
        .booking_service
        .create(customer, class.id, FundingChoice::SinglePayment)
        .await?;

    let applied = app.ctx.booking_service.expire_payment(booking.id).await?;
    assert_eq!(applied, Applied::Changed);

    let after = app.ctx.booking_repo.find_by_id(booking.id).await?.unwrap();
    assert_eq!(after.status, BookingStatus::Cancelled);
    assert_eq!(after.payment_status, PaymentStatus::Expired);

    // Redelivery is a no-op.
    let repeat = app.ctx.booking_service.expire_payment(booking.id).await?;
    assert_eq!(repeat, Applied::Unchanged);
    Ok(())
}

#[tokio::test]
async fn last_credit_feeds_exactly_one_of_two_simultaneous_bookings() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let class_a = create_class(&app, "yoga", "studio-a", 10, Duration::days(1)).await?;
    let class_b = create_class(&app, "yoga", "studio-a", 10, Duration::days(2)).await?;
    let package = grant_package(&app, customer, 1, "yoga").await?;

    let service_a = app.ctx.booking_service.clone();
    let service_b = app.ctx.booking_service.clone();
    let funding = FundingChoice::PackageCredit {
        package_id: package.id,
    };
    let (first, second) = tokio::join!(
        service_a.create(customer, class_a.id, funding),
        service_b.create(customer, class_b.id, funding)
    );

    let oks = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(oks, 1);
    let winner = if first.is_ok() { first? } else { second? };
    assert_eq!(winner.status, BookingStatus::Confirmed);

    let loser = if winner.class_id == class_a.id {
        app.ctx
            .booking_service
            .create(customer, class_b.id, funding)
            .await
    } else {
        app.ctx
            .booking_service
            .create(customer, class_a.id, funding)
            .await
    };
    assert!(matches!(
        loser.unwrap_err(),
        AppError::InsufficientCredits
    ));
    Ok(())
}

#[tokio::test]
async fn full_class_rejects_booking() -> anyhow::Result<()> {
    let app = setup().await?;
    let class = create_class(&app, "yoga", "studio-a", 1, Duration::days(1)).await?;

    let holder = Uuid::new_v4();
    let package = grant_package(&app, holder, 3, "yoga").await?;
    app.ctx
        .booking_service
        .create(
            holder,
            class.id,
            FundingChoice::PackageCredit {
                package_id: package.id,
            },
        )
        .await?;

    let late_customer = Uuid::new_v4();
    let late_package = grant_package(&app, late_customer, 3, "yoga").await?;
    let err = app
        .ctx
        .booking_service
        .create(
            late_customer,
            class.id,
            FundingChoice::PackageCredit {
                package_id: late_package.id,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ClassFull));

    // No partial mutation: the rejected booking spent nothing.
    let after = app
        .ctx
        .package_repo
        .find_by_id(late_package.id)
        .await?
        .unwrap();
    assert_eq!(after.remaining_credits, 3);
    Ok(())
}

#[tokio::test]
async fn package_credit_only_funds_its_own_category() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let pilates = create_class(&app, "pilates", "studio-a", 10, Duration::days(1)).await?;
    let yoga_package = grant_package(&app, customer, 5, "yoga").await?;

    let err = app
        .ctx
        .booking_service
        .create(
            customer,
            pilates.id,
            FundingChoice::PackageCredit {
                package_id: yoga_package.id,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PackageCategoryMismatch));

    // Rejected before the ledger was touched.
    let after = app
        .ctx
        .package_repo
        .find_by_id(yoga_package.id)
        .await?
        .unwrap();
    assert_eq!(after.remaining_credits, 5);
    assert_eq!(app.ctx.class_repo.confirmed_count(pilates.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn reschedule_moves_the_seat_without_touching_credits() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let original = create_class(&app, "yoga", "studio-a", 5, Duration::days(1)).await?;
    let target = create_class(&app, "yoga", "studio-a", 5, Duration::days(3)).await?;
    let booking = confirmed_booking(&app, customer, original.id).await?;
    let package_id = booking.package_id.unwrap();

    let moved = app
        .ctx
        .booking_service
        .reschedule(booking.id, target.id)
        .await?;

    assert_eq!(moved.class_id, target.id);
    assert_eq!(moved.status, BookingStatus::Confirmed);
    let package = app.ctx.package_repo.find_by_id(package_id).await?.unwrap();
    assert_eq!(package.remaining_credits, 4, "still exactly one credit spent");
    assert_eq!(app.ctx.class_repo.confirmed_count(original.id).await?, 0);
    assert_eq!(app.ctx.class_repo.confirmed_count(target.id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn reschedule_requires_matching_category_and_location() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let original = create_class(&app, "yoga", "studio-a", 5, Duration::days(1)).await?;
    let wrong_category = create_class(&app, "pilates", "studio-a", 5, Duration::days(3)).await?;
    let wrong_location = create_class(&app, "yoga", "studio-b", 5, Duration::days(3)).await?;
    let booking = confirmed_booking(&app, customer, original.id).await?;

    for target in [wrong_category.id, wrong_location.id] {
        let err = app
            .ctx
            .booking_service
            .reschedule(booking.id, target)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ClassTypeMismatch));
    }

    let unchanged = app.ctx.booking_repo.find_by_id(booking.id).await?.unwrap();
    assert_eq!(unchanged.class_id, original.id);
    Ok(())
}

#[tokio::test]
async fn reschedule_refuses_started_and_full_targets() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let original = create_class(&app, "yoga", "studio-a", 5, Duration::days(1)).await?;
    let booking = confirmed_booking(&app, customer, original.id).await?;

    let started = create_class(&app, "yoga", "studio-a", 5, Duration::hours(-1)).await?;
    let err = app
        .ctx
        .booking_service
        .reschedule(booking.id, started.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyStarted));

    let full = create_class(&app, "yoga", "studio-a", 1, Duration::days(2)).await?;
    confirmed_booking(&app, Uuid::new_v4(), full.id).await?;
    let err = app
        .ctx
        .booking_service
        .reschedule(booking.id, full.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ClassFull));

    let unchanged = app.ctx.booking_repo.find_by_id(booking.id).await?.unwrap();
    assert_eq!(unchanged.class_id, original.id);
    Ok(())
}

#[tokio::test]
async fn no_show_frees_the_seat_but_keeps_the_credit_spent() -> anyhow::Result<()> {
    let app = setup().await?;
    let customer = Uuid::new_v4();
    let class = create_class(&app, "yoga", "studio-a", 5, Duration::days(1)).await?;
    let booking = confirmed_booking(&app, customer, class.id).await?;
    let package_id = booking.package_id.unwrap();

    let seat_freed = app.ctx.booking_service.mark_no_show(booking.id).await?;
    assert_eq!(seat_freed, Some(class.id));

    let after = app.ctx.booking_repo.find_by_id(booking.id).await?.unwrap();
    assert_eq!(after.status, BookingStatus::NoShow);

    // No-show forfeits the credit.
    let package = app.ctx.package_repo.find_by_id(package_id).await?.unwrap();
    assert_eq!(package.remaining_credits, 4);

    // Marking again is a quiet no-op.
    let repeat = app.ctx.booking_service.mark_no_show(booking.id).await?;
    assert!(repeat.is_none());
    Ok(())
}
