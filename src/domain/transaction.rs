use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{PaymentMethod, PaymentStatus};

/// Append-only financial record. One row per settled payment event;
/// amounts and statuses are never edited once `paid_at` is set, and
/// corrections are new rows. The external payment id doubles as the dedup
/// key for at-least-once webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub transaction_type: TransactionType,
    pub customer_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub package_id: Option<Uuid>,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub external_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionType {
    PackagePurchase,
    SingleClass,
}
