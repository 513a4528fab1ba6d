use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    domain::{Package, PackageStatus},
    error::{AppError, Result},
    repository::{PackageRepository, PackageTypeRepository},
};

/// Retry budget for the conditional deduct/refund updates when the backing
/// store reports contention (SQLite busy, serialization conflicts).
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Owns every credit mutation. `remaining_credits` only moves through the
/// repository's single-statement conditional updates, so two concurrent
/// deductions for the last credit cannot both win and a refund can never
/// push remaining past total.
pub struct CreditLedger {
    packages: Arc<dyn PackageRepository>,
    package_types: Arc<dyn PackageTypeRepository>,
}

impl CreditLedger {
    pub fn new(
        packages: Arc<dyn PackageRepository>,
        package_types: Arc<dyn PackageTypeRepository>,
    ) -> Self {
        Self {
            packages,
            package_types,
        }
    }

    pub async fn deduct(&self, package_id: Uuid, count: i32) -> Result<()> {
        let now = Utc::now();
        let mut last_err = None;
        for _ in 0..MAX_WRITE_ATTEMPTS {
            match self.packages.try_deduct(package_id, count, now).await {
                Ok(true) => return Ok(()),
                // The guard failed; classify against the current row rather
                // than guessing.
                Ok(false) => return Err(self.classify_deduct_failure(package_id, count, now).await?),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            AppError::Internal("credit deduct exhausted retries".to_string())
        }))
    }

    async fn classify_deduct_failure(
        &self,
        package_id: Uuid,
        count: i32,
        now: DateTime<Utc>,
    ) -> Result<AppError> {
        let package = self
            .packages
            .find_by_id(package_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Package not found".to_string()))?;

        if package.expires_at <= now {
            return Ok(AppError::PackageNotActive("Package has expired".to_string()));
        }
        if package.status != PackageStatus::Active {
            return Ok(AppError::PackageNotActive(
                "Package is not active".to_string(),
            ));
        }
        if package.remaining_credits < count {
            return Ok(AppError::InsufficientCredits);
        }
        // Guard failed but the row now looks fine: a concurrent writer got
        // in between. Report it as contention on the credits.
        Ok(AppError::InsufficientCredits)
    }

    /// Checks that the package's type covers `class_category` before any
    /// credit is spent on it. The category on a package type never changes,
    /// so check-then-deduct cannot race.
    pub async fn ensure_covers(&self, package_id: Uuid, class_category: &str) -> Result<()> {
        let package = self
            .packages
            .find_by_id(package_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Package not found".to_string()))?;
        let package_type = self
            .package_types
            .find_by_id(package.package_type_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Package type not found".to_string()))?;

        if package_type.class_category != class_category {
            return Err(AppError::PackageCategoryMismatch);
        }
        Ok(())
    }

    pub async fn refund(&self, package_id: Uuid, count: i32) -> Result<()> {
        let mut last_err = None;
        for _ in 0..MAX_WRITE_ATTEMPTS {
            match self.packages.try_refund(package_id, count).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    let exists = self.packages.find_by_id(package_id).await?.is_some();
                    if !exists {
                        return Err(AppError::NotFound("Package not found".to_string()));
                    }
                    return Err(AppError::WouldExceedTotal);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            AppError::Internal("credit refund exhausted retries".to_string())
        }))
    }

    /// Creates a package from a settled purchase. Expiry is computed from
    /// the gateway's settlement time, not the webhook arrival time.
    pub async fn grant(
        &self,
        customer_id: Uuid,
        package_type_id: Uuid,
        purchased_at: DateTime<Utc>,
    ) -> Result<Package> {
        let package_type = self
            .package_types
            .find_by_id(package_type_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Package type not found".to_string()))?;

        let now = Utc::now();
        self.packages
            .create(Package {
                id: Uuid::new_v4(),
                customer_id,
                package_type_id,
                total_credits: package_type.credits,
                remaining_credits: package_type.credits,
                expires_at: package_type.expiry_from(purchased_at),
                status: PackageStatus::Active,
                created_at: now,
                updated_at: now,
            })
            .await
    }

    /// Advisory sweep: flips status on packages whose expiry has passed.
    /// Deductions check expiry at use time regardless.
    pub async fn expire_sweep(&self) -> Result<u64> {
        let flipped = self.packages.mark_expired_before(Utc::now()).await?;
        if flipped > 0 {
            tracing::info!("Expired {} package(s)", flipped);
        }
        Ok(flipped)
    }
}
