use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Booking, BookingStatus, PaymentMethod, PaymentStatus},
    error::{AppError, Result},
    repository::BookingRepository,
};

#[derive(FromRow)]
struct BookingRow {
    id: String,
    customer_id: String,
    class_id: String,
    package_id: Option<String>,
    payment_method: String,
    payment_status: String,
    status: String,
    external_payment_id: Option<String>,
    cancellation_reason: Option<String>,
    cancelled_at: Option<NaiveDateTime>,
    requires_manual_refund: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteBookingRepository {
    pool: SqlitePool,
}

impl SqliteBookingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: BookingRow) -> Result<Booking> {
        let package_id = row
            .package_id
            .as_ref()
            .map(|id| Uuid::parse_str(id))
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Booking {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            customer_id: Uuid::parse_str(&row.customer_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            class_id: Uuid::parse_str(&row.class_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            package_id,
            payment_method: Self::parse_payment_method(&row.payment_method)?,
            payment_status: Self::parse_payment_status(&row.payment_status)?,
            status: Self::parse_status(&row.status)?,
            external_payment_id: row.external_payment_id,
            cancellation_reason: row.cancellation_reason,
            cancelled_at: row
                .cancelled_at
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            requires_manual_refund: row.requires_manual_refund != 0,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_status(s: &str) -> Result<BookingStatus> {
        match s {
            "PendingPayment" => Ok(BookingStatus::PendingPayment),
            "Confirmed" => Ok(BookingStatus::Confirmed),
            "Cancelled" => Ok(BookingStatus::Cancelled),
            "Completed" => Ok(BookingStatus::Completed),
            "NoShow" => Ok(BookingStatus::NoShow),
            _ => Err(AppError::Database(format!("Invalid booking status: {}", s))),
        }
    }

    fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Paid" => Ok(PaymentStatus::Paid),
            "Failed" => Ok(PaymentStatus::Failed),
            "Expired" => Ok(PaymentStatus::Expired),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }

    fn payment_status_to_str(status: &PaymentStatus) -> &'static str {
        match status {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Expired => "Expired",
        }
    }

    fn parse_payment_method(s: &str) -> Result<PaymentMethod> {
        match s {
            "PackageCredit" => Ok(PaymentMethod::PackageCredit),
            "SinglePayment" => Ok(PaymentMethod::SinglePayment),
            _ => Err(AppError::Database(format!("Invalid payment method: {}", s))),
        }
    }

    fn payment_method_to_str(method: &PaymentMethod) -> &'static str {
        match method {
            PaymentMethod::PackageCredit => "PackageCredit",
            PaymentMethod::SinglePayment => "SinglePayment",
        }
    }
}

#[async_trait]
impl BookingRepository for SqliteBookingRepository {
    async fn create_guarded(&self, booking: Booking, capacity: i32) -> Result<bool> {
        let id_str = booking.id.to_string();
        let class_id_str = booking.class_id.to_string();
        let method_str = Self::payment_method_to_str(&booking.payment_method);
        let payment_status_str = Self::payment_status_to_str(&booking.payment_status);
        let status_str = booking.status.as_str();
        let now = Utc::now().naive_utc();

        // INSERT ... SELECT with the confirmed-count guard evaluated in the
        // same statement, so the last seat cannot be handed out twice.
        let result = sqlx::query(
            r#"
            INSERT INTO bookings (
                id, customer_id, class_id, package_id, payment_method,
                payment_status, status, external_payment_id,
                requires_manual_refund, created_at, updated_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?
            WHERE (
                SELECT COUNT(*) FROM bookings
                WHERE class_id = ? AND status = 'Confirmed'
            ) < ?
            "#,
        )
        .bind(&id_str)
        .bind(booking.customer_id.to_string())
        .bind(&class_id_str)
        .bind(booking.package_id.map(|id| id.to_string()))
        .bind(method_str)
        .bind(payment_status_str)
        .bind(status_str)
        .bind(&booking.external_payment_id)
        .bind(now)
        .bind(now)
        .bind(&class_id_str)
        .bind(capacity)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, customer_id, class_id, package_id, payment_method,
                   payment_status, status, external_payment_id,
                   cancellation_reason, cancelled_at, requires_manual_refund,
                   created_at, updated_at
            FROM bookings
            WHERE id = ?
            "#,
        )
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_booking(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_class(&self, class_id: Uuid) -> Result<Vec<Booking>> {
        let class_id_str = class_id.to_string();
        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT id, customer_id, class_id, package_id, payment_method,
                   payment_status, status, external_payment_id,
                   cancellation_reason, cancelled_at, requires_manual_refund,
                   created_at, updated_at
            FROM bookings
            WHERE class_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(class_id_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_booking).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        payment_status: Option<PaymentStatus>,
        external_payment_id: Option<&str>,
    ) -> Result<bool> {
        let id_str = id.to_string();
        let payment_status_str = payment_status.map(|s| Self::payment_status_to_str(&s));
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = ?,
                payment_status = COALESCE(?, payment_status),
                external_payment_id = COALESCE(?, external_payment_id),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(payment_status_str)
        .bind(external_payment_id)
        .bind(now)
        .bind(&id_str)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn transition_cancelled(
        &self,
        id: Uuid,
        from: BookingStatus,
        payment_status: Option<PaymentStatus>,
        reason: &str,
        requires_manual_refund: bool,
    ) -> Result<bool> {
        let id_str = id.to_string();
        let payment_status_str = payment_status.map(|s| Self::payment_status_to_str(&s));
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'Cancelled',
                payment_status = COALESCE(?, payment_status),
                cancellation_reason = ?,
                cancelled_at = ?,
                requires_manual_refund = ?,
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(payment_status_str)
        .bind(reason)
        .bind(now)
        .bind(if requires_manual_refund { 1i32 } else { 0i32 })
        .bind(now)
        .bind(&id_str)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn reassign_class(&self, id: Uuid, new_class_id: Uuid, capacity: i32) -> Result<bool> {
        let id_str = id.to_string();
        let new_class_str = new_class_id.to_string();
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET class_id = ?, updated_at = ?
            WHERE id = ?
              AND status = 'Confirmed'
              AND (
                  SELECT COUNT(*) FROM bookings
                  WHERE class_id = ? AND status = 'Confirmed'
              ) < ?
            "#,
        )
        .bind(&new_class_str)
        .bind(now)
        .bind(&id_str)
        .bind(&new_class_str)
        .bind(capacity)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_external_payment_id(&self, id: Uuid, external_payment_id: &str) -> Result<()> {
        let id_str = id.to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            UPDATE bookings
            SET external_payment_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(external_payment_id)
        .bind(now)
        .bind(&id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
