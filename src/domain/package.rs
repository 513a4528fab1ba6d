use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Defines what a purchasable credit bundle looks like: how many credits,
/// how long they stay valid, and which class category they may be spent on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageType {
    pub id: Uuid,
    pub name: String,
    pub credits: i32,
    pub validity_days: i64,
    pub class_category: String,
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl PackageType {
    /// Expiry is anchored to the purchase settlement time, not to when the
    /// webhook happened to arrive.
    pub fn expiry_from(&self, purchased_at: DateTime<Utc>) -> DateTime<Utc> {
        purchased_at + Duration::days(self.validity_days)
    }
}

/// A purchased credit grant. `remaining_credits` is never assigned
/// directly; it only moves through the Credit Ledger's conditional
/// deduct/refund updates, which keep `0 <= remaining <= total`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub package_type_id: Uuid,
    pub total_credits: i32,
    pub remaining_credits: i32,
    pub expires_at: DateTime<Utc>,
    pub status: PackageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PackageStatus {
    Active,
    Expired,
    Depleted,
}
