use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

pub mod invoice;
pub mod midtrans;
pub mod reference;
pub mod xendit;

pub use invoice::{InvoiceIssuer, InvoiceRequest, IssuedInvoice, LoggingInvoiceIssuer};
pub use midtrans::MidtransGateway;
pub use xendit::XenditGateway;

/// The normalized shape every adapter produces. Provider idiosyncrasy stops
/// here; nothing downstream branches on which gateway delivered it.
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    pub gateway: &'static str,
    /// The gateway's settlement identifier (order id or invoice id). Used
    /// as the natural dedup key for transaction rows.
    pub external_reference: String,
    pub raw_status: String,
    pub amount_cents: i64,
    pub metadata: PaymentMetadata,
}

#[derive(Debug, Clone)]
pub struct PaymentMetadata {
    pub customer_id: Uuid,
    pub subject: PaymentSubject,
    pub transaction_time: DateTime<Utc>,
}

/// What the money was for: a credit package, or one invoice covering one or
/// more class bookings (group submissions share an invoice).
#[derive(Debug, Clone)]
pub enum PaymentSubject {
    Package { package_type_id: Uuid },
    Classes { booking_ids: Vec<Uuid> },
}

/// Contract every gateway adapter implements. `verify` authenticates the
/// raw payload and returns the normalized notification; any verification
/// failure short-circuits before state is touched.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;
    async fn verify(&self, body: &str, headers: &HeaderMap) -> Result<PaymentNotification>;
}
