use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    domain::*,
    error::{AppError, Result},
    gateways::{reference::ExternalReference, InvoiceIssuer, InvoiceRequest},
    notify::{Notification, NotificationManager, Template},
    repository::{BookingRepository, ClassRepository},
    service::credit_ledger::CreditLedger,
};

/// Result of an idempotent transition: either this call moved the booking,
/// or a previous delivery already had.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub booking: Booking,
    /// Set when a confirmed seat on a future class was released; the caller
    /// runs the waitlist matcher for that class.
    pub seat_freed: Option<Uuid>,
    pub requires_manual_refund: bool,
}

/// The booking lifecycle. Transitions are enforced twice: in the domain
/// transition table and again as guarded UPDATEs in the repository, so a
/// concurrent writer losing the race sees a clean failure instead of a
/// silent overwrite.
pub struct BookingService {
    bookings: Arc<dyn BookingRepository>,
    classes: Arc<dyn ClassRepository>,
    ledger: Arc<CreditLedger>,
    invoices: Arc<dyn InvoiceIssuer>,
    notifier: Arc<NotificationManager>,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        classes: Arc<dyn ClassRepository>,
        ledger: Arc<CreditLedger>,
        invoices: Arc<dyn InvoiceIssuer>,
        notifier: Arc<NotificationManager>,
    ) -> Self {
        Self {
            bookings,
            classes,
            ledger,
            invoices,
            notifier,
        }
    }

    /// Creates a booking. Credit funding deducts first and only inserts the
    /// booking once the credit is in hand, directly as Confirmed; single
    /// payment inserts as PendingPayment and hands off to invoice creation.
    pub async fn create(
        &self,
        customer_id: Uuid,
        class_id: Uuid,
        funding: FundingChoice,
    ) -> Result<Booking> {
        let now = Utc::now();
        let class = self
            .classes
            .find_by_id(class_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;

        if class.has_started(now) {
            return Err(AppError::AlreadyStarted);
        }
        if !class.is_bookable(now) {
            return Err(AppError::Conflict("Class is not open for booking".to_string()));
        }
        if self.classes.confirmed_count(class_id).await? >= class.capacity as i64 {
            return Err(AppError::ClassFull);
        }

        match funding {
            FundingChoice::PackageCredit { package_id } => {
                self.create_credit_funded(customer_id, &class, package_id)
                    .await
            }
            FundingChoice::SinglePayment => self.create_single_payment(customer_id, &class).await,
        }
    }

    async fn create_credit_funded(
        &self,
        customer_id: Uuid,
        class: &ClassSession,
        package_id: Uuid,
    ) -> Result<Booking> {
        self.ledger.ensure_covers(package_id, &class.category).await?;
        self.ledger.deduct(package_id, 1).await?;

        let booking = Booking {
            id: Uuid::new_v4(),
            customer_id,
            class_id: class.id,
            package_id: Some(package_id),
            payment_method: PaymentMethod::PackageCredit,
            payment_status: PaymentStatus::Paid,
            status: BookingStatus::Confirmed,
            external_payment_id: None,
            cancellation_reason: None,
            cancelled_at: None,
            requires_manual_refund: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let inserted = self
            .bookings
            .create_guarded(booking.clone(), class.capacity)
            .await?;
        if !inserted {
            // Lost the last seat after the credit was spent; hand it back.
            if let Err(e) = self.ledger.refund(package_id, 1).await {
                tracing::error!(
                    package_id = %package_id,
                    "Failed to return credit after full-class race: {:?}",
                    e
                );
            }
            return Err(AppError::ClassFull);
        }

        self.notifier
            .dispatch(Notification {
                customer_id,
                template: Template::BookingConfirmed,
                fields: vec![
                    ("class", class.name.clone()),
                    ("starts_at", class.start_time.to_rfc3339()),
                ],
            })
            .await;

        Ok(booking)
    }

    async fn create_single_payment(
        &self,
        customer_id: Uuid,
        class: &ClassSession,
    ) -> Result<Booking> {
        let mut booking = Booking {
            id: Uuid::new_v4(),
            customer_id,
            class_id: class.id,
            package_id: None,
            payment_method: PaymentMethod::SinglePayment,
            payment_status: PaymentStatus::Pending,
            status: BookingStatus::PendingPayment,
            external_payment_id: None,
            cancellation_reason: None,
            cancelled_at: None,
            requires_manual_refund: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let inserted = self
            .bookings
            .create_guarded(booking.clone(), class.capacity)
            .await?;
        if !inserted {
            return Err(AppError::ClassFull);
        }

        let invoice = self
            .invoices
            .issue(InvoiceRequest {
                customer_id,
                amount_cents: class.price_cents,
                description: format!("Class booking: {}", class.name),
                reference: ExternalReference::Class {
                    customer_id,
                    booking_ids: vec![booking.id],
                },
            })
            .await?;

        self.bookings
            .set_external_payment_id(booking.id, &invoice.external_order_id)
            .await?;
        booking.external_payment_id = Some(invoice.external_order_id);

        Ok(booking)
    }

    /// Settles a pending booking. Duplicate deliveries are a no-op, not an
    /// error; a terminal booking refuses.
    pub async fn confirm(&self, booking_id: Uuid, external_payment_id: &str) -> Result<Applied> {
        let booking = self.require(booking_id).await?;

        match booking.status {
            BookingStatus::PendingPayment => {
                let moved = self
                    .bookings
                    .transition(
                        booking_id,
                        BookingStatus::PendingPayment,
                        BookingStatus::Confirmed,
                        Some(PaymentStatus::Paid),
                        Some(external_payment_id),
                    )
                    .await?;
                if !moved {
                    // A concurrent delivery won the guard; re-read to decide.
                    let current = self.require(booking_id).await?;
                    return if current.status == BookingStatus::Confirmed {
                        Ok(Applied::Unchanged)
                    } else {
                        Err(Self::invalid(current.status, BookingStatus::Confirmed))
                    };
                }
                self.notify_for(&booking, Template::BookingConfirmed).await;
                Ok(Applied::Changed)
            }
            BookingStatus::Confirmed => Ok(Applied::Unchanged),
            other => Err(Self::invalid(other, BookingStatus::Confirmed)),
        }
    }

    /// Cancels from PendingPayment or Confirmed. A credit-funded booking
    /// releases exactly one credit back to its package; a paid
    /// single-payment booking is flagged for an out-of-band money refund.
    pub async fn cancel(&self, booking_id: Uuid, reason: &str) -> Result<CancelOutcome> {
        let booking = self.require(booking_id).await?;

        match booking.status {
            BookingStatus::Cancelled => Ok(CancelOutcome {
                requires_manual_refund: booking.requires_manual_refund,
                booking,
                seat_freed: None,
            }),
            BookingStatus::PendingPayment | BookingStatus::Confirmed => {
                self.apply_cancel(booking, reason, None).await
            }
            other => Err(Self::invalid(other, BookingStatus::Cancelled)),
        }
    }

    /// Gateway-reported payment failure (deny, cancel, failed): cancels the
    /// booking and records the failed payment status on it, not just in the
    /// transaction log.
    pub async fn fail_payment(&self, booking_id: Uuid, reason: &str) -> Result<CancelOutcome> {
        let booking = self.require(booking_id).await?;

        match booking.status {
            BookingStatus::Cancelled => Ok(CancelOutcome {
                requires_manual_refund: booking.requires_manual_refund,
                booking,
                seat_freed: None,
            }),
            BookingStatus::PendingPayment | BookingStatus::Confirmed => {
                self.apply_cancel(booking, reason, Some(PaymentStatus::Failed))
                    .await
            }
            other => Err(Self::invalid(other, BookingStatus::Cancelled)),
        }
    }

    async fn apply_cancel(
        &self,
        booking: Booking,
        reason: &str,
        payment_status: Option<PaymentStatus>,
    ) -> Result<CancelOutcome> {
        let was_confirmed = booking.status == BookingStatus::Confirmed;
        let requires_manual_refund = booking.payment_method == PaymentMethod::SinglePayment
            && booking.payment_status == PaymentStatus::Paid;

        let moved = self
            .bookings
            .transition_cancelled(
                booking.id,
                booking.status,
                payment_status,
                reason,
                requires_manual_refund,
            )
            .await?;
        if !moved {
            let current = self.require(booking.id).await?;
            return if current.status == BookingStatus::Cancelled {
                Ok(CancelOutcome {
                    requires_manual_refund: current.requires_manual_refund,
                    booking: current,
                    seat_freed: None,
                })
            } else {
                Err(Self::invalid(current.status, BookingStatus::Cancelled))
            };
        }

        // The guarded transition committed, so this cancel owns the single
        // credit release for the booking.
        if let Some(package_id) = booking.package_id {
            self.ledger.refund(package_id, 1).await?;
        }

        if requires_manual_refund {
            tracing::warn!(
                booking_id = %booking.id,
                "Paid single-payment booking cancelled; manual refund required"
            );
        }

        let seat_freed = if was_confirmed {
            match self.classes.find_by_id(booking.class_id).await? {
                Some(class) if !class.has_started(Utc::now()) => Some(class.id),
                _ => None,
            }
        } else {
            None
        };

        self.notify_for(&booking, Template::BookingCancelled).await;

        let current = self.require(booking.id).await?;
        Ok(CancelOutcome {
            requires_manual_refund,
            booking: current,
            seat_freed,
        })
    }

    /// Gateway-side payment expiry: only a pending booking dies this way.
    /// No credit is involved since none was ever deducted.
    pub async fn expire_payment(&self, booking_id: Uuid) -> Result<Applied> {
        let booking = self.require(booking_id).await?;

        match booking.status {
            BookingStatus::PendingPayment => {
                let moved = self
                    .bookings
                    .transition_cancelled(
                        booking_id,
                        BookingStatus::PendingPayment,
                        Some(PaymentStatus::Expired),
                        "payment expired",
                        false,
                    )
                    .await?;
                if !moved {
                    let current = self.require(booking_id).await?;
                    return if current.status == BookingStatus::Cancelled {
                        Ok(Applied::Unchanged)
                    } else {
                        Err(Self::invalid(current.status, BookingStatus::Cancelled))
                    };
                }
                Ok(Applied::Changed)
            }
            BookingStatus::Cancelled => Ok(Applied::Unchanged),
            other => Err(Self::invalid(other, BookingStatus::Cancelled)),
        }
    }

    /// Marks a confirmed booking as a no-show. Returns the class id so the
    /// caller can run the waitlist matcher if the class has not started.
    pub async fn mark_no_show(&self, booking_id: Uuid) -> Result<Option<Uuid>> {
        let booking = self.require(booking_id).await?;

        match booking.status {
            BookingStatus::NoShow => Ok(None),
            BookingStatus::Confirmed => {
                let moved = self
                    .bookings
                    .transition(
                        booking_id,
                        BookingStatus::Confirmed,
                        BookingStatus::NoShow,
                        None,
                        None,
                    )
                    .await?;
                if !moved {
                    let current = self.require(booking_id).await?;
                    return if current.status == BookingStatus::NoShow {
                        Ok(None)
                    } else {
                        Err(Self::invalid(current.status, BookingStatus::NoShow))
                    };
                }
                match self.classes.find_by_id(booking.class_id).await? {
                    Some(class) if !class.has_started(Utc::now()) => Ok(Some(class.id)),
                    _ => Ok(None),
                }
            }
            other => Err(Self::invalid(other, BookingStatus::NoShow)),
        }
    }

    pub async fn complete(&self, booking_id: Uuid) -> Result<Applied> {
        let booking = self.require(booking_id).await?;

        match booking.status {
            BookingStatus::Completed => Ok(Applied::Unchanged),
            BookingStatus::Confirmed => {
                let moved = self
                    .bookings
                    .transition(
                        booking_id,
                        BookingStatus::Confirmed,
                        BookingStatus::Completed,
                        None,
                        None,
                    )
                    .await?;
                if moved {
                    Ok(Applied::Changed)
                } else {
                    Ok(Applied::Unchanged)
                }
            }
            other => Err(Self::invalid(other, BookingStatus::Completed)),
        }
    }

    /// Repoints a confirmed booking at another class. Category and location
    /// must match the original class (product rule, enforced here and not
    /// just in UI filtering); the target must not have started; capacity is
    /// recomputed inside the guarded UPDATE. Credits are untouched.
    pub async fn reschedule(&self, booking_id: Uuid, new_class_id: Uuid) -> Result<Booking> {
        let now = Utc::now();
        let booking = self.require(booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(Self::invalid(booking.status, BookingStatus::Confirmed));
        }
        if booking.class_id == new_class_id {
            return Err(AppError::BadRequest(
                "Booking is already on that class".to_string(),
            ));
        }

        let old_class = self
            .classes
            .find_by_id(booking.class_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Original class not found".to_string()))?;
        let new_class = self
            .classes
            .find_by_id(new_class_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Target class not found".to_string()))?;

        if new_class.category != old_class.category || new_class.location != old_class.location {
            return Err(AppError::ClassTypeMismatch);
        }
        if new_class.has_started(now) || !new_class.is_bookable(now) {
            return Err(AppError::AlreadyStarted);
        }

        let moved = self
            .bookings
            .reassign_class(booking_id, new_class_id, new_class.capacity)
            .await?;
        if !moved {
            return Err(AppError::ClassFull);
        }

        self.require(booking_id).await
    }

    async fn require(&self, booking_id: Uuid) -> Result<Booking> {
        self.bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
    }

    async fn notify_for(&self, booking: &Booking, template: Template) {
        let class_name = match self.classes.find_by_id(booking.class_id).await {
            Ok(Some(class)) => class.name,
            _ => booking.class_id.to_string(),
        };
        self.notifier
            .dispatch(Notification {
                customer_id: booking.customer_id,
                template,
                fields: vec![
                    ("class", class_name),
                    ("booking_id", booking.id.to_string()),
                ],
            })
            .await;
    }

    fn invalid(from: BookingStatus, to: BookingStatus) -> AppError {
        AppError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }
}
