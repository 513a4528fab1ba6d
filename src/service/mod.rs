pub mod booking_service;
pub mod credit_ledger;
pub mod reconciler;
pub mod waitlist_service;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::gateways::InvoiceIssuer;
use crate::notify::NotificationManager;
use crate::repository::*;

pub use booking_service::{Applied, BookingService, CancelOutcome};
pub use credit_ledger::CreditLedger;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use waitlist_service::WaitlistService;

/// Wires the repositories and services together. Storage is injected here
/// by the process entry point (or a test harness with an in-memory pool);
/// nothing below this holds global client state.
pub struct ServiceContext {
    pub class_repo: Arc<dyn ClassRepository>,
    pub package_repo: Arc<dyn PackageRepository>,
    pub package_type_repo: Arc<dyn PackageTypeRepository>,
    pub booking_repo: Arc<dyn BookingRepository>,
    pub transaction_repo: Arc<dyn TransactionRepository>,
    pub waitlist_repo: Arc<dyn WaitlistRepository>,
    pub ledger: Arc<CreditLedger>,
    pub booking_service: Arc<BookingService>,
    pub waitlist_service: Arc<WaitlistService>,
    pub reconciler: Arc<Reconciler>,
    pub notifier: Arc<NotificationManager>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        invoices: Arc<dyn InvoiceIssuer>,
        notifier: Arc<NotificationManager>,
    ) -> Self {
        let class_repo: Arc<dyn ClassRepository> =
            Arc::new(SqliteClassRepository::new(db_pool.clone()));
        let package_repo: Arc<dyn PackageRepository> =
            Arc::new(SqlitePackageRepository::new(db_pool.clone()));
        let package_type_repo: Arc<dyn PackageTypeRepository> =
            Arc::new(SqlitePackageTypeRepository::new(db_pool.clone()));
        let booking_repo: Arc<dyn BookingRepository> =
            Arc::new(SqliteBookingRepository::new(db_pool.clone()));
        let transaction_repo: Arc<dyn TransactionRepository> =
            Arc::new(SqliteTransactionRepository::new(db_pool.clone()));
        let waitlist_repo: Arc<dyn WaitlistRepository> =
            Arc::new(SqliteWaitlistRepository::new(db_pool.clone()));

        let ledger = Arc::new(CreditLedger::new(
            package_repo.clone(),
            package_type_repo.clone(),
        ));
        let booking_service = Arc::new(BookingService::new(
            booking_repo.clone(),
            class_repo.clone(),
            ledger.clone(),
            invoices,
            notifier.clone(),
        ));
        let waitlist_service = Arc::new(WaitlistService::new(
            waitlist_repo.clone(),
            class_repo.clone(),
            booking_service.clone(),
            notifier.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            booking_service.clone(),
            ledger.clone(),
            transaction_repo.clone(),
            waitlist_service.clone(),
            notifier.clone(),
        ));

        Self {
            class_repo,
            package_repo,
            package_type_repo,
            booking_repo,
            transaction_repo,
            waitlist_repo,
            ledger,
            booking_service,
            waitlist_service,
            reconciler,
            notifier,
            db_pool,
        }
    }
}
