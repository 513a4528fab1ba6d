use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::*;
use crate::error::Result;

pub mod booking_repository;
pub mod class_repository;
pub mod package_repository;
pub mod package_type_repository;
pub mod transaction_repository;
pub mod waitlist_repository;

pub use booking_repository::SqliteBookingRepository;
pub use class_repository::SqliteClassRepository;
pub use package_repository::SqlitePackageRepository;
pub use package_type_repository::SqlitePackageTypeRepository;
pub use transaction_repository::SqliteTransactionRepository;
pub use waitlist_repository::SqliteWaitlistRepository;

#[async_trait]
pub trait ClassRepository: Send + Sync {
    async fn create(&self, class: ClassSession) -> Result<ClassSession>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ClassSession>>;
    async fn list_upcoming(&self, limit: i64) -> Result<Vec<ClassSession>>;
    async fn update_status(&self, id: Uuid, status: ClassStatus) -> Result<()>;
    /// Seats actually held: confirmed bookings only. Always recomputed from
    /// the bookings table, never cached.
    async fn confirmed_count(&self, class_id: Uuid) -> Result<i64>;
}

#[async_trait]
pub trait PackageTypeRepository: Send + Sync {
    async fn create(&self, package_type: PackageType) -> Result<PackageType>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PackageType>>;
    async fn list(&self) -> Result<Vec<PackageType>>;
}

#[async_trait]
pub trait PackageRepository: Send + Sync {
    async fn create(&self, package: Package) -> Result<Package>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Package>>;
    async fn list_by_customer(&self, customer_id: Uuid) -> Result<Vec<Package>>;
    /// Single conditional UPDATE: decrements `remaining_credits` by `count`
    /// only while the package is active, unexpired at `now`, and holds at
    /// least `count` credits. Returns whether a row changed. Flips status
    /// to Depleted when the decrement lands on zero.
    async fn try_deduct(&self, id: Uuid, count: i32, now: DateTime<Utc>) -> Result<bool>;
    /// Counterpart conditional UPDATE: increments only while
    /// `remaining + count <= total`; revives a Depleted package to Active.
    async fn try_refund(&self, id: Uuid, count: i32) -> Result<bool>;
    /// Advisory status sweep; expiry stays authoritative at use time.
    async fn mark_expired_before(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Inserts only while the class still has a free confirmed seat
    /// (count recomputed inside the statement). Returns whether the row
    /// was inserted.
    async fn create_guarded(&self, booking: Booking, capacity: i32) -> Result<bool>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>>;
    async fn list_by_class(&self, class_id: Uuid) -> Result<Vec<Booking>>;
    /// Guarded state transition: flips `status` only if the row is still in
    /// `from`. Concurrent writers race on the guard; exactly one wins.
    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        payment_status: Option<PaymentStatus>,
        external_payment_id: Option<&str>,
    ) -> Result<bool>;
    /// Cancellation variant of `transition` that also records the reason,
    /// timestamp, and whether an out-of-band money refund is owed.
    async fn transition_cancelled(
        &self,
        id: Uuid,
        from: BookingStatus,
        payment_status: Option<PaymentStatus>,
        reason: &str,
        requires_manual_refund: bool,
    ) -> Result<bool>;
    /// Repoints the booking at `new_class_id` only while that class has a
    /// free confirmed seat, counted inside the statement (last-seat safe).
    async fn reassign_class(&self, id: Uuid, new_class_id: Uuid, capacity: i32) -> Result<bool>;
    async fn set_external_payment_id(&self, id: Uuid, external_payment_id: &str) -> Result<()>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Append-only insert, deduplicated on the external payment id.
    /// Returns false when a row for that external id already exists.
    async fn insert_deduped(&self, transaction: Transaction) -> Result<bool>;
    /// Backfills the granted package on a purchase row whose insert was the
    /// dedup gate for the grant.
    async fn set_package_id(&self, id: Uuid, package_id: Uuid) -> Result<()>;
    async fn find_by_external_id(&self, external_payment_id: &str) -> Result<Option<Transaction>>;
    async fn list_by_customer(&self, customer_id: Uuid) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    async fn create(&self, entry: WaitlistEntry) -> Result<WaitlistEntry>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<WaitlistEntry>>;
    /// Oldest `waiting` entry for the class; strict FIFO by creation time.
    async fn next_waiting(&self, class_id: Uuid) -> Result<Option<WaitlistEntry>>;
    async fn update_status(&self, id: Uuid, status: WaitlistStatus) -> Result<()>;
}
