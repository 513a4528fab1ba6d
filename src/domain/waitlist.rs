use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer waiting for a seat on a full class. `created_at` is the FIFO
/// key for promotion. When `auto_book` is set and the referenced package
/// still has a usable credit, promotion books the seat on the customer's
/// behalf; otherwise they get a "spot opened" notification and stay
/// waiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub class_id: Uuid,
    pub status: WaitlistStatus,
    pub auto_book: bool,
    pub package_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WaitlistStatus {
    Waiting,
    Promoted,
    Expired,
}
