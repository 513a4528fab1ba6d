use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::PackageType,
    error::{AppError, Result},
    repository::PackageTypeRepository,
};

#[derive(FromRow)]
struct PackageTypeRow {
    id: String,
    name: String,
    credits: i32,
    validity_days: i64,
    class_category: String,
    price_cents: i64,
    created_at: NaiveDateTime,
}

pub struct SqlitePackageTypeRepository {
    pool: SqlitePool,
}

impl SqlitePackageTypeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_package_type(row: PackageTypeRow) -> Result<PackageType> {
        Ok(PackageType {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            name: row.name,
            credits: row.credits,
            validity_days: row.validity_days,
            class_category: row.class_category,
            price_cents: row.price_cents,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

#[async_trait]
impl PackageTypeRepository for SqlitePackageTypeRepository {
    async fn create(&self, package_type: PackageType) -> Result<PackageType> {
        let id_str = package_type.id.to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO package_types (
                id, name, credits, validity_days, class_category,
                price_cents, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(&package_type.name)
        .bind(package_type.credits)
        .bind(package_type.validity_days)
        .bind(&package_type.class_category)
        .bind(package_type.price_cents)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(package_type.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created package type".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PackageType>> {
        let id_str = id.to_string();
        let row = sqlx::query_as::<_, PackageTypeRow>(
            r#"
            SELECT id, name, credits, validity_days, class_category,
                   price_cents, created_at
            FROM package_types
            WHERE id = ?
            "#,
        )
        .bind(id_str)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_package_type(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<PackageType>> {
        let rows = sqlx::query_as::<_, PackageTypeRow>(
            r#"
            SELECT id, name, credits, validity_days, class_category,
                   price_cents, created_at
            FROM package_types
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_package_type).collect()
    }
}
