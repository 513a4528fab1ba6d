use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{PaymentMethod, PaymentStatus, Transaction, TransactionType},
    error::{AppError, Result},
    repository::TransactionRepository,
};

#[derive(FromRow)]
struct TransactionRow {
    id: String,
    transaction_type: String,
    customer_id: String,
    booking_id: Option<String>,
    package_id: Option<String>,
    amount_cents: i64,
    payment_method: String,
    payment_status: String,
    external_payment_id: Option<String>,
    paid_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
}

pub struct SqliteTransactionRepository {
    pool: SqlitePool,
}

impl SqliteTransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_transaction(row: TransactionRow) -> Result<Transaction> {
        let booking_id = row
            .booking_id
            .as_ref()
            .map(|id| Uuid::parse_str(id))
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;
        let package_id = row
            .package_id
            .as_ref()
            .map(|id| Uuid::parse_str(id))
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Transaction {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            transaction_type: Self::parse_type(&row.transaction_type)?,
            customer_id: Uuid::parse_str(&row.customer_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            booking_id,
            package_id,
            amount_cents: row.amount_cents,
            payment_method: Self::parse_payment_method(&row.payment_method)?,
            payment_status: Self::parse_payment_status(&row.payment_status)?,
            external_payment_id: row.external_payment_id,
            paid_at: row
                .paid_at
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }

    fn parse_type(s: &str) -> Result<TransactionType> {
        match s {
            "PackagePurchase" => Ok(TransactionType::PackagePurchase),
            "SingleClass" => Ok(TransactionType::SingleClass),
            _ => Err(AppError::Database(format!(
                "Invalid transaction type: {}",
                s
            ))),
        }
    }

    fn type_to_str(transaction_type: &TransactionType) -> &'static str {
        match transaction_type {
            TransactionType::PackagePurchase => "PackagePurchase",
            TransactionType::SingleClass => "SingleClass",
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
impl TransactionRepository for SqliteTransactionRepository {
    async fn insert_deduped(&self, transaction: Transaction) -> Result<bool> {
        let id_str = transaction.id.to_string();
        let type_str = Self::type_to_str(&transaction.transaction_type);
        let method_str = Self::payment_method_to_str(&transaction.payment_method);
        let status_str = Self::payment_status_to_str(&transaction.payment_status);
        let paid_at_naive = transaction.paid_at.map(|dt| dt.naive_utc());
        let now = Utc::now().naive_utc();

        // INSERT OR IGNORE against the unique external_payment_id index:
        // redelivered webhooks fall through without a second row.
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO transactions (
                id, transaction_type, customer_id, booking_id, package_id,
                amount_cents, payment_method, payment_status,
                external_payment_id, paid_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(type_str)
        .bind(transaction.customer_id.to_string())
        .bind(transaction.booking_id.map(|id| id.to_string()))
        .bind(transaction.package_id.map(|id| id.to_string()))
        .bind(transaction.amount_cents)
        .bind(method_str)
        .bind(status_str)
        .bind(&transaction.external_payment_id)
        .bind(paid_at_naive)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_package_id(&self, id: Uuid, package_id: Uuid) -> Result<()> {
        let id_str = id.to_string();
        let package_id_str = package_id.to_string();

        sqlx::query(
            r#"
            UPDATE transactions
            SET package_id = ?
            WHERE id = ?
            "#,
        )
        .bind(&package_id_str)
        .bind(&id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find_by_external_id(&self, external_payment_id: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, transaction_type, customer_id, booking_id, package_id,
                   amount_cents, payment_method, payment_status,
                   external_payment_id, paid_at, created_at
            FROM transactions
            WHERE external_payment_id = ?
            "#,
        )
        .bind(external_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_transaction(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_customer(&self, customer_id: Uuid) -> Result<Vec<Transaction>> {
        let customer_id_str = customer_id.to_string();
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, transaction_type, customer_id, booking_id, package_id,
                   amount_cents, payment_method, payment_status,
                   external_payment_id, paid_at, created_at
            FROM transactions
            WHERE customer_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id_str)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }
}
