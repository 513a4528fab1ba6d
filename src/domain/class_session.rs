use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A schedulable unit of the studio timetable. Capacity is fixed at
/// creation; bookings reference the class by id and never carry a copy of
/// its capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: i32,
    pub price_cents: i64,
    pub status: ClassStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClassStatus {
    Scheduled,
    Delayed,
    Cancelled,
    Completed,
}

impl ClassSession {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }

    /// Whether the class can still accept bookings or waitlist promotions.
    pub fn is_bookable(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, ClassStatus::Scheduled | ClassStatus::Delayed)
            && !self.has_started(now)
    }
}

#[derive(Debug, Clone, Deserialize, validator::Validate)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub category: String,
    #[validate(length(min = 1, max = 120))]
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(range(min = 1, max = 500))]
    pub capacity: i32,
    #[validate(range(min = 0))]
    pub price_cents: i64,
}
