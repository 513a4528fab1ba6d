use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    domain::*,
    error::{AppError, Result},
    notify::{Notification, NotificationManager, Template},
    repository::{ClassRepository, WaitlistRepository},
    service::booking_service::BookingService,
};

/// Reacts to a confirmed seat being freed on a future class. Selection is
/// strict FIFO; one freed slot produces one promotion attempt or one
/// notification, never a cascade down the list.
pub struct WaitlistService {
    waitlist: Arc<dyn WaitlistRepository>,
    classes: Arc<dyn ClassRepository>,
    bookings: Arc<BookingService>,
    notifier: Arc<NotificationManager>,
}

impl WaitlistService {
    pub fn new(
        waitlist: Arc<dyn WaitlistRepository>,
        classes: Arc<dyn ClassRepository>,
        bookings: Arc<BookingService>,
        notifier: Arc<NotificationManager>,
    ) -> Self {
        Self {
            waitlist,
            classes,
            bookings,
            notifier,
        }
    }

    /// Joins the waitlist for a full class.
    pub async fn join(
        &self,
        customer_id: Uuid,
        class_id: Uuid,
        auto_book: bool,
        package_id: Option<Uuid>,
    ) -> Result<WaitlistEntry> {
        let now = Utc::now();
        let class = self
            .classes
            .find_by_id(class_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Class not found".to_string()))?;
        if !class.is_bookable(now) {
            return Err(AppError::Conflict(
                "Class is not open for waitlisting".to_string(),
            ));
        }
        if self.classes.confirmed_count(class_id).await? < class.capacity as i64 {
            return Err(AppError::Conflict(
                "Class still has open seats; book directly".to_string(),
            ));
        }

        self.waitlist
            .create(WaitlistEntry {
                id: Uuid::new_v4(),
                customer_id,
                class_id,
                status: WaitlistStatus::Waiting,
                auto_book,
                package_id,
                created_at: now,
            })
            .await
    }

    /// Promotes the head of the queue for a freed seat. With auto_book and
    /// a usable credit the seat is booked on the customer's behalf; when
    /// the credit path cannot pay (insufficient, expired, wrong category,
    /// package gone) the matcher degrades to notify-only rather than
    /// moving to the next waitlister.
    pub async fn promote_next(&self, class_id: Uuid) -> Result<Option<WaitlistEntry>> {
        let now = Utc::now();
        let class = match self.classes.find_by_id(class_id).await? {
            Some(class) => class,
            None => return Ok(None),
        };
        if !class.is_bookable(now) {
            return Ok(None);
        }

        let entry = match self.waitlist.next_waiting(class_id).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if entry.auto_book {
            if let Some(package_id) = entry.package_id {
                return self.try_auto_book(entry, package_id).await;
            }
        }

        self.notify_slot_open(&entry, &class.name).await;
        Ok(Some(entry))
    }

    async fn try_auto_book(
        &self,
        entry: WaitlistEntry,
        package_id: Uuid,
    ) -> Result<Option<WaitlistEntry>> {
        let class_name = match self.classes.find_by_id(entry.class_id).await? {
            Some(class) => class.name,
            None => entry.class_id.to_string(),
        };

        match self
            .bookings
            .create(
                entry.customer_id,
                entry.class_id,
                FundingChoice::PackageCredit { package_id },
            )
            .await
        {
            Ok(_) => {
                self.waitlist
                    .update_status(entry.id, WaitlistStatus::Promoted)
                    .await?;
                tracing::info!(
                    entry_id = %entry.id,
                    class_id = %entry.class_id,
                    "Waitlist entry auto-booked and promoted"
                );
                Ok(Some(entry))
            }
            // The credit could not pay; fall back to telling the customer a
            // spot is open so they can book by hand. They keep their place.
            Err(
                AppError::InsufficientCredits
                | AppError::PackageNotActive(_)
                | AppError::PackageCategoryMismatch
                | AppError::NotFound(_),
            ) => {
                self.notify_slot_open(&entry, &class_name).await;
                Ok(Some(entry))
            }
            // Someone else took the seat between the cancel and this
            // promotion; nothing to hand out.
            Err(AppError::ClassFull) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn notify_slot_open(&self, entry: &WaitlistEntry, class_name: &str) {
        self.notifier
            .dispatch(Notification {
                customer_id: entry.customer_id,
                template: Template::WaitlistSlotOpen,
                fields: vec![
                    ("class", class_name.to_string()),
                    ("class_id", entry.class_id.to_string()),
                ],
            })
            .await;
    }
}
