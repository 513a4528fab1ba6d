use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{ClassSession, ClassStatus},
    error::{AppError, Result},
    repository::ClassRepository,
};

#[derive(FromRow)]
struct ClassRow {
    id: String,
    name: String,
    category: String,
    location: String,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    capacity: i32,
    price_cents: i64,
    status: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteClassRepository {
    pool: SqlitePool,
}

impl SqliteClassRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_class(row: ClassRow) -> Result<ClassSession> {
        Ok(ClassSession {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            name: row.name,
            category: row.category,
            location: row.location,
            start_time: DateTime::from_naive_utc_and_offset(row.start_time, Utc),
            end_time: DateTime::from_naive_utc_and_offset(row.end_time, Utc),
            capacity: row.capacity,
            price_cents: row.price_cents,
            status: Self::parse_status(&row.status)?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_status(s: &str) -> Result<ClassStatus> {
        match s {
            "Scheduled" => Ok(ClassStatus::Scheduled),
            "Delayed" => Ok(ClassStatus::Delayed),
            "Cancelled" => Ok(ClassStatus::Cancelled),
            "Completed" => Ok(ClassStatus::Completed),
            _ => Err(AppError::Database(format!("Invalid class status: {}", s))),
        }
    }

    fn status_to_str(status: &ClassStatus) -> &'static str {
        match status {
            ClassStatus::Scheduled => "Scheduled",
            ClassStatus::Delayed => "Delayed",
            ClassStatus::Cancelled => "Cancelled",
            ClassStatus::Completed => "Completed",
        }
    }
}

#[async_trait]
impl ClassRepository for SqliteClassRepository {
    async fn create(&self, class: ClassSession) -> Result<ClassSession> {
        let id_str = class.id.to_string();
        let status_str = Self::status_to_str(&class.status);
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO classes (
                id, name, category, location, start_time, end_time,
                capacity, price_cents, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(&class.name)
        .bind(&class.category)
        .bind(&class.location)
        .bind(class.start_time.naive_utc())
        .bind(class.end_time.naive_utc())
        .bind(class.capacity)
        .bind(class.price_cents)
        .bind(status_str)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(class.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created class".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ClassSession>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, ClassRow>(
            r#"
            SELECT id, name, category, location, start_time, end_time,
                   capacity, price_cents, status, created_at, updated_at
            FROM classes
            WHERE id = ?
            "#,
        )
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_class(r)?)),
            None => Ok(None),
        }
    }

    async fn list_upcoming(&self, limit: i64) -> Result<Vec<ClassSession>> {
        let now = Utc::now().naive_utc();
        let rows = sqlx::query_as::<_, ClassRow>(
            r#"
            SELECT id, name, category, location, start_time, end_time,
                   capacity, price_cents, status, created_at, updated_at
            FROM classes
            WHERE start_time > ? AND status IN ('Scheduled', 'Delayed')
            ORDER BY start_time ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_class).collect()
    }

    async fn update_status(&self, id: Uuid, status: ClassStatus) -> Result<()> {
        let id_str = id.to_string();
        let status_str = Self::status_to_str(&status);
        let now = Utc::now().naive_utc();

        // Completed classes are immutable.
        let result = sqlx::query(
            r#"
            UPDATE classes
            SET status = ?, updated_at = ?
            WHERE id = ? AND status != 'Completed'
            "#,
        )
        .bind(status_str)
        .bind(now)
        .bind(&id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "Class not found or already completed".to_string(),
            ));
        }
        Ok(())
    }

    async fn confirmed_count(&self, class_id: Uuid) -> Result<i64> {
        let class_id_str = class_id.to_string();
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM bookings
            WHERE class_id = ? AND status = 'Confirmed'
            "#,
        )
        .bind(class_id_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count.0)
    }
}
