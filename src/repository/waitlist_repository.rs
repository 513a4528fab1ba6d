use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{WaitlistEntry, WaitlistStatus},
    error::{AppError, Result},
    repository::WaitlistRepository,
};

#[derive(FromRow)]
struct WaitlistRow {
    id: String,
    customer_id: String,
    class_id: String,
    status: String,
    auto_book: i32,
    package_id: Option<String>,
    created_at: NaiveDateTime,
}

pub struct SqliteWaitlistRepository {
    pool: SqlitePool,
}

impl SqliteWaitlistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: WaitlistRow) -> Result<WaitlistEntry> {
        let package_id = row
            .package_id
            .as_ref()
            .map(|id| Uuid::parse_str(id))
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(WaitlistEntry {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            customer_id: Uuid::parse_str(&row.customer_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            class_id: Uuid::parse_str(&row.class_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            status: Self::parse_status(&row.status)?,
            auto_book: row.auto_book != 0,
            package_id,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }

    fn parse_status(s: &str) -> Result<WaitlistStatus> {
        match s {
            "Waiting" => Ok(WaitlistStatus::Waiting),
            "Promoted" => Ok(WaitlistStatus::Promoted),
            "Expired" => Ok(WaitlistStatus::Expired),
            _ => Err(AppError::Database(format!(
                "Invalid waitlist status: {}",
                s
            ))),
        }
    }

    fn status_to_str(status: &WaitlistStatus) -> &'static str {
        match status {
            WaitlistStatus::Waiting => "Waiting",
            WaitlistStatus::Promoted => "Promoted",
            WaitlistStatus::Expired => "Expired",
        }
    }
}

#[async_trait]
impl WaitlistRepository for SqliteWaitlistRepository {
    async fn create(&self, entry: WaitlistEntry) -> Result<WaitlistEntry> {
        let id_str = entry.id.to_string();
        let status_str = Self::status_to_str(&entry.status);
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO waitlist (
                id, customer_id, class_id, status, auto_book,
                package_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(entry.customer_id.to_string())
        .bind(entry.class_id.to_string())
        .bind(status_str)
        .bind(if entry.auto_book { 1i32 } else { 0i32 })
        .bind(entry.package_id.map(|id| id.to_string()))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(entry.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created waitlist entry".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WaitlistEntry>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, WaitlistRow>(
            r#"
            SELECT id, customer_id, class_id, status, auto_book,
                   package_id, created_at
            FROM waitlist
            WHERE id = ?
            "#,
        )
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_entry(r)?)),
            None => Ok(None),
        }
    }

    async fn next_waiting(&self, class_id: Uuid) -> Result<Option<WaitlistEntry>> {
        let class_id_str = class_id.to_string();
        let row = sqlx::query_as::<_, WaitlistRow>(
            r#"
            SELECT id, customer_id, class_id, status, auto_book,
                   package_id, created_at
            FROM waitlist
            WHERE class_id = ? AND status = 'Waiting'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(class_id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_entry(r)?)),
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: Uuid, status: WaitlistStatus) -> Result<()> {
        let id_str = id.to_string();
        let status_str = Self::status_to_str(&status);

        let result = sqlx::query(
            r#"
            UPDATE waitlist
            SET status = ?
            WHERE id = ?
            "#,
        )
        .bind(status_str)
        .bind(&id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Waitlist entry not found".to_string()));
        }
        Ok(())
    }
}
