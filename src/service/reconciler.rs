use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::*,
    error::{AppError, Result},
    gateways::{PaymentNotification, PaymentSubject},
    notify::{Notification, NotificationManager, Template},
    repository::TransactionRepository,
    service::{
        booking_service::BookingService, credit_ledger::CreditLedger,
        waitlist_service::WaitlistService,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    PackageGranted { package_id: Uuid },
    /// A transaction row for this external payment id already exists; the
    /// delivery is a duplicate and nothing was re-applied.
    AlreadyProcessed,
    BookingsReconciled { applied: usize, total: usize },
    /// Processed but intentionally without effect (e.g. a pending status).
    Acknowledged,
}

/// What a raw gateway status means for the booking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BookingAction {
    Confirm,
    Cancel,
    Expire,
    /// Interim status; acknowledged without touching anything.
    None,
}

/// Fixed mapping from both gateways' status vocabularies to internal
/// effect. Anything not in the table is rejected, not guessed at.
fn map_status(raw: &str) -> Option<(PaymentStatus, BookingAction)> {
    match raw.to_ascii_lowercase().as_str() {
        "settlement" | "capture" | "paid" => Some((PaymentStatus::Paid, BookingAction::Confirm)),
        "expire" | "expired" => Some((PaymentStatus::Expired, BookingAction::Expire)),
        "deny" | "cancel" | "failed" => Some((PaymentStatus::Failed, BookingAction::Cancel)),
        "pending" => Some((PaymentStatus::Pending, BookingAction::None)),
        _ => None,
    }
}

/// Applies a verified, normalized notification to the ledger, the booking
/// state machine, and the transaction log. Must stay idempotent under
/// at-least-once delivery and commutative for redeliveries of the same
/// terminal status: the external payment id dedups transaction rows, and
/// transitions already at (or past) their target count as handled.
pub struct Reconciler {
    bookings: Arc<BookingService>,
    ledger: Arc<CreditLedger>,
    transactions: Arc<dyn TransactionRepository>,
    waitlist: Arc<WaitlistService>,
    notifier: Arc<NotificationManager>,
}

impl Reconciler {
    pub fn new(
        bookings: Arc<BookingService>,
        ledger: Arc<CreditLedger>,
        transactions: Arc<dyn TransactionRepository>,
        waitlist: Arc<WaitlistService>,
        notifier: Arc<NotificationManager>,
    ) -> Self {
        Self {
            bookings,
            ledger,
            transactions,
            waitlist,
            notifier,
        }
    }

    pub async fn reconcile(&self, notification: PaymentNotification) -> Result<ReconcileOutcome> {
        let (payment_status, action) = map_status(&notification.raw_status).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Unrecognized gateway status {:?} from {}",
                notification.raw_status, notification.gateway
            ))
        })?;

        if action == BookingAction::None {
            tracing::debug!(
                gateway = notification.gateway,
                reference = %notification.external_reference,
                "Interim status acknowledged"
            );
            return Ok(ReconcileOutcome::Acknowledged);
        }

        match notification.metadata.subject.clone() {
            PaymentSubject::Package { package_type_id } => {
                self.reconcile_package(&notification, package_type_id, payment_status)
                    .await
            }
            PaymentSubject::Classes { booking_ids } => {
                self.reconcile_bookings(&notification, &booking_ids, payment_status, action)
                    .await
            }
        }
    }

    async fn reconcile_package(
        &self,
        notification: &PaymentNotification,
        package_type_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<ReconcileOutcome> {
        let customer_id = notification.metadata.customer_id;
        let paid = payment_status == PaymentStatus::Paid;

        // The transaction row is the dedup gate, not a pre-check: the
        // unique external payment id lets exactly one delivery insert it,
        // and only that delivery may grant. Concurrent duplicates lose the
        // insert itself.
        let transaction_id = Uuid::new_v4();
        let inserted = self
            .transactions
            .insert_deduped(Transaction {
                id: transaction_id,
                transaction_type: TransactionType::PackagePurchase,
                customer_id,
                booking_id: None,
                package_id: None,
                amount_cents: notification.amount_cents,
                payment_method: PaymentMethod::SinglePayment,
                payment_status,
                external_payment_id: Some(notification.external_reference.clone()),
                paid_at: paid.then_some(notification.metadata.transaction_time),
                created_at: chrono::Utc::now(),
            })
            .await?;
        if !inserted {
            tracing::info!(
                reference = %notification.external_reference,
                "Duplicate package notification ignored"
            );
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        if !paid {
            return Ok(ReconcileOutcome::Acknowledged);
        }

        let package = self
            .ledger
            .grant(
                customer_id,
                package_type_id,
                notification.metadata.transaction_time,
            )
            .await?;
        self.transactions
            .set_package_id(transaction_id, package.id)
            .await?;

        self.notifier
            .dispatch(Notification {
                customer_id,
                template: Template::PackageActivated,
                fields: vec![("package_id", package.id.to_string())],
            })
            .await;
        Ok(ReconcileOutcome::PackageGranted {
            package_id: package.id,
        })
    }

    async fn reconcile_bookings(
        &self,
        notification: &PaymentNotification,
        booking_ids: &[Uuid],
        payment_status: PaymentStatus,
        action: BookingAction,
    ) -> Result<ReconcileOutcome> {
        let mut applied = 0;
        let mut freed_classes: Vec<Uuid> = Vec::new();

        for &booking_id in booking_ids {
            let result = match action {
                BookingAction::Confirm => self
                    .bookings
                    .confirm(booking_id, &notification.external_reference)
                    .await
                    .map(|_| None),
                BookingAction::Expire => self
                    .bookings
                    .expire_payment(booking_id)
                    .await
                    .map(|_| None),
                BookingAction::Cancel => self
                    .bookings
                    .fail_payment(booking_id, "payment failed")
                    .await
                    .map(|outcome| outcome.seat_freed),
                BookingAction::None => unreachable!("interim statuses return early"),
            };

            match result {
                Ok(seat_freed) => {
                    applied += 1;
                    if let Some(class_id) = seat_freed {
                        if !freed_classes.contains(&class_id) {
                            freed_classes.push(class_id);
                        }
                    }
                }
                // Out-of-order or duplicate delivery hit a booking that has
                // already moved on (e.g. expire after settlement, anything
                // after a terminal state). The state machine refused, which
                // is the invariant holding; acknowledged, not retried.
                Err(AppError::InvalidTransition { from, to }) => {
                    tracing::warn!(
                        booking_id = %booking_id,
                        reference = %notification.external_reference,
                        "Out-of-order notification ignored: {} -> {}",
                        from,
                        to
                    );
                }
                Err(e) => return Err(e),
            }
        }

        // One transaction row for the invoice, referencing the first
        // booking; the unique external id makes redelivery a no-op.
        let inserted = self
            .transactions
            .insert_deduped(Transaction {
                id: Uuid::new_v4(),
                transaction_type: TransactionType::SingleClass,
                customer_id: notification.metadata.customer_id,
                booking_id: booking_ids.first().copied(),
                package_id: None,
                amount_cents: notification.amount_cents,
                payment_method: PaymentMethod::SinglePayment,
                payment_status,
                external_payment_id: Some(notification.external_reference.clone()),
                paid_at: (payment_status == PaymentStatus::Paid)
                    .then_some(notification.metadata.transaction_time),
                created_at: chrono::Utc::now(),
            })
            .await?;
        if !inserted && applied == 0 {
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        for class_id in freed_classes {
            self.waitlist.promote_next(class_id).await?;
        }

        Ok(ReconcileOutcome::BookingsReconciled {
            applied,
            total: booking_ids.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_covers_both_gateways() {
        assert_eq!(
            map_status("settlement"),
            Some((PaymentStatus::Paid, BookingAction::Confirm))
        );
        assert_eq!(
            map_status("capture"),
            Some((PaymentStatus::Paid, BookingAction::Confirm))
        );
        assert_eq!(
            map_status("PAID"),
            Some((PaymentStatus::Paid, BookingAction::Confirm))
        );
        assert_eq!(
            map_status("expire"),
            Some((PaymentStatus::Expired, BookingAction::Expire))
        );
        assert_eq!(
            map_status("EXPIRED"),
            Some((PaymentStatus::Expired, BookingAction::Expire))
        );
        assert_eq!(
            map_status("deny"),
            Some((PaymentStatus::Failed, BookingAction::Cancel))
        );
        assert_eq!(
            map_status("pending"),
            Some((PaymentStatus::Pending, BookingAction::None))
        );
    }

    #[test]
    fn unknown_statuses_are_not_guessed_at() {
        assert_eq!(map_status("refund"), None);
        assert_eq!(map_status(""), None);
        assert_eq!(map_status("chargeback"), None);
    }
}
