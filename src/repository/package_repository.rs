use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Package, PackageStatus},
    error::{AppError, Result},
    repository::PackageRepository,
};

#[derive(FromRow)]
struct PackageRow {
    id: String,
    customer_id: String,
    package_type_id: String,
    total_credits: i32,
    remaining_credits: i32,
    expires_at: NaiveDateTime,
    status: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqlitePackageRepository {
    pool: SqlitePool,
}

impl SqlitePackageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_package(row: PackageRow) -> Result<Package> {
        Ok(Package {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            customer_id: Uuid::parse_str(&row.customer_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            package_type_id: Uuid::parse_str(&row.package_type_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            total_credits: row.total_credits,
            remaining_credits: row.remaining_credits,
            expires_at: DateTime::from_naive_utc_and_offset(row.expires_at, Utc),
            status: Self::parse_status(&row.status)?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_status(s: &str) -> Result<PackageStatus> {
        match s {
            "Active" => Ok(PackageStatus::Active),
            "Expired" => Ok(PackageStatus::Expired),
            "Depleted" => Ok(PackageStatus::Depleted),
            _ => Err(AppError::Database(format!("Invalid package status: {}", s))),
        }
    }

    fn status_to_str(status: &PackageStatus) -> &'static str {
        match status {
            PackageStatus::Active => "Active",
            PackageStatus::Expired => "Expired",
            PackageStatus::Depleted => "Depleted",
        }
    }
}

#[async_trait]
impl PackageRepository for SqlitePackageRepository {
    async fn create(&self, package: Package) -> Result<Package> {
        let id_str = package.id.to_string();
        let status_str = Self::status_to_str(&package.status);
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO packages (
                id, customer_id, package_type_id, total_credits,
                remaining_credits, expires_at, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(package.customer_id.to_string())
        .bind(package.package_type_id.to_string())
        .bind(package.total_credits)
        .bind(package.remaining_credits)
        .bind(package.expires_at.naive_utc())
        .bind(status_str)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(package.id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created package".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Package>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, PackageRow>(
            r#"
            SELECT id, customer_id, package_type_id, total_credits,
                   remaining_credits, expires_at, status, created_at, updated_at
            FROM packages
            WHERE id = ?
            "#,
        )
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_package(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_customer(&self, customer_id: Uuid) -> Result<Vec<Package>> {
        let customer_id_str = customer_id.to_string();
        let rows = sqlx::query_as::<_, PackageRow>(
            r#"
            SELECT id, customer_id, package_type_id, total_credits,
                   remaining_credits, expires_at, status, created_at, updated_at
            FROM packages
            WHERE customer_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_package).collect()
    }

    async fn try_deduct(&self, id: Uuid, count: i32, now: DateTime<Utc>) -> Result<bool> {
        let id_str = id.to_string();
        let now_naive = now.naive_utc();
        let updated_at = Utc::now().naive_utc();

        // One conditional UPDATE; two concurrent deductions for the last
        // credit race on the remaining_credits guard and exactly one wins.
        // Expiry is checked here, at use time, not against the advisory
        // status column alone.
        let result = sqlx::query(
            r#"
            UPDATE packages
            SET remaining_credits = remaining_credits - ?,
                status = CASE
                    WHEN remaining_credits - ? = 0 THEN 'Depleted'
                    ELSE status
                END,
                updated_at = ?
            WHERE id = ?
              AND status = 'Active'
              AND expires_at > ?
              AND remaining_credits >= ?
            "#,
        )
        .bind(count)
        .bind(count)
        .bind(updated_at)
        .bind(&id_str)
        .bind(now_naive)
        .bind(count)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn try_refund(&self, id: Uuid, count: i32) -> Result<bool> {
        let id_str = id.to_string();
        let updated_at = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE packages
            SET remaining_credits = remaining_credits + ?,
                status = CASE
                    WHEN status = 'Depleted' THEN 'Active'
                    ELSE status
                END,
                updated_at = ?
            WHERE id = ?
              AND remaining_credits + ? <= total_credits
            "#,
        )
        .bind(count)
        .bind(updated_at)
        .bind(&id_str)
        .bind(count)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_expired_before(&self, now: DateTime<Utc>) -> Result<u64> {
        let now_naive = now.naive_utc();
        let updated_at = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE packages
            SET status = 'Expired', updated_at = ?
            WHERE status = 'Active' AND expires_at <= ?
            "#,
        )
        .bind(updated_at)
        .bind(now_naive)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
