use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha512};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    gateways::{PaymentGateway, PaymentMetadata, PaymentNotification, PaymentSubject},
};

/// The notification body Midtrans posts, and the shape its status endpoint
/// returns. Field names are the gateway's wire contract and must stay
/// verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct MidtransPayload {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    #[serde(default)]
    pub signature_key: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub transaction_time: Option<String>,
    #[serde(default)]
    pub custom_field1: Option<String>,
    #[serde(default)]
    pub custom_field2: Option<String>,
    #[serde(default)]
    pub custom_field3: Option<String>,
}

/// The status-fetch half of the adapter, split behind a trait so tests can
/// stand in a fixture instead of the live endpoint.
#[async_trait]
pub trait MidtransApi: Send + Sync {
    async fn fetch_status(&self, order_id: &str) -> Result<MidtransPayload>;
}

pub struct HttpMidtransApi {
    http: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl HttpMidtransApi {
    pub fn new(base_url: String, server_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            server_key,
        })
    }
}

#[async_trait]
impl MidtransApi for HttpMidtransApi {
    async fn fetch_status(&self, order_id: &str) -> Result<MidtransPayload> {
        let url = format!("{}/v2/{}/status", self.base_url, order_id);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(|e| {
                // Timeouts are retryable: the gateway will redeliver.
                AppError::Reconcile(format!("Midtrans status fetch failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Reconcile(format!(
                "Midtrans status fetch returned {}",
                response.status()
            )));
        }

        response
            .json::<MidtransPayload>()
            .await
            .map_err(|e| AppError::Reconcile(format!("Midtrans status body unreadable: {}", e)))
    }
}

/// Signature-verified Midtrans adapter. The inbound signature is a SHA-512
/// digest over order id + status code + gross amount + server key. After
/// the signature checks out we still re-fetch the transaction from the
/// status endpoint and use those values: a forged payload whose signature
/// happens to verify against stale fields must not steer reconciliation.
pub struct MidtransGateway {
    server_key: String,
    api: Arc<dyn MidtransApi>,
}

impl MidtransGateway {
    pub fn new(server_key: String, api: Arc<dyn MidtransApi>) -> Self {
        Self { server_key, api }
    }

    fn expected_signature(&self, payload: &MidtransPayload) -> String {
        let mut hasher = Sha512::new();
        hasher.update(payload.order_id.as_bytes());
        hasher.update(payload.status_code.as_bytes());
        hasher.update(payload.gross_amount.as_bytes());
        hasher.update(self.server_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Fraud screening folds into the status vocabulary: a capture that the
    /// screen rejected is a denial, whatever transaction_status says.
    fn effective_status(payload: &MidtransPayload) -> String {
        match payload.fraud_status.as_deref() {
            Some("deny") => "deny".to_string(),
            _ => payload.transaction_status.clone(),
        }
    }

    fn metadata_from(payload: &MidtransPayload) -> Result<PaymentMetadata> {
        let customer_id = payload
            .custom_field1
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                AppError::MalformedReference(format!(
                    "order {} has no usable customer id",
                    payload.order_id
                ))
            })?;

        let subject_type = payload.custom_field3.as_deref().unwrap_or_default();
        let ids = payload.custom_field2.as_deref().unwrap_or_default();

        let subject = match subject_type {
            "package" => {
                let package_type_id = Uuid::parse_str(ids.trim()).map_err(|_| {
                    AppError::MalformedReference(format!(
                        "order {} has bad package type id {:?}",
                        payload.order_id, ids
                    ))
                })?;
                PaymentSubject::Package { package_type_id }
            }
            "class" => {
                // Multi-attendee group bookings share one invoice; the
                // booking ids come comma-joined.
                let booking_ids = ids
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Uuid::parse_str)
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| {
                        AppError::MalformedReference(format!(
                            "order {} has bad booking id list {:?}",
                            payload.order_id, ids
                        ))
                    })?;
                if booking_ids.is_empty() {
                    return Err(AppError::MalformedReference(format!(
                        "order {} has an empty booking id list",
                        payload.order_id
                    )));
                }
                PaymentSubject::Classes { booking_ids }
            }
            other => {
                return Err(AppError::MalformedReference(format!(
                    "order {} has unknown subject type {:?}",
                    payload.order_id, other
                )))
            }
        };

        Ok(PaymentMetadata {
            customer_id,
            subject,
            transaction_time: parse_transaction_time(payload.transaction_time.as_deref()),
        })
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    fn name(&self) -> &'static str {
        "midtrans"
    }

    async fn verify(&self, body: &str, _headers: &HeaderMap) -> Result<PaymentNotification> {
        let payload: MidtransPayload = serde_json::from_str(body)
            .map_err(|e| AppError::BadRequest(format!("Unparseable Midtrans payload: {}", e)))?;

        let expected = self.expected_signature(&payload);
        if payload.signature_key != expected {
            return Err(AppError::VerificationFailed(format!(
                "signature mismatch for order {}",
                payload.order_id
            )));
        }

        // Authoritative values come from the status endpoint, not the
        // notification body.
        let detail = self.api.fetch_status(&payload.order_id).await?;

        let amount_cents = parse_gross_amount(&detail.gross_amount)?;
        let metadata = Self::metadata_from(&detail)?;

        Ok(PaymentNotification {
            gateway: self.name(),
            external_reference: detail.order_id.clone(),
            raw_status: Self::effective_status(&detail),
            amount_cents,
            metadata,
        })
    }
}

/// Midtrans reports gross_amount as a decimal string like "150000.00".
/// Parsed without going through floating point.
fn parse_gross_amount(raw: &str) -> Result<i64> {
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };
    let whole: i64 = whole
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Bad gross_amount: {:?}", raw)))?;
    let cents = match frac.len() {
        0 => 0,
        1 | 2 => {
            let mut padded = frac.to_string();
            while padded.len() < 2 {
                padded.push('0');
            }
            padded
                .parse::<i64>()
                .map_err(|_| AppError::BadRequest(format!("Bad gross_amount: {:?}", raw)))?
        }
        _ => return Err(AppError::BadRequest(format!("Bad gross_amount: {:?}", raw))),
    };
    Ok(whole * 100 + cents)
}

/// Midtrans timestamps look like "2024-03-05 14:30:00". A missing or
/// unreadable one falls back to now rather than failing the notification.
fn parse_transaction_time(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or_else(Utc::now)
}

#[cfg(any(test, feature = "test-utils"))]
pub struct FakeMidtransApi {
    pub payload: std::sync::Mutex<Option<MidtransPayload>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl FakeMidtransApi {
    pub fn returning(payload: MidtransPayload) -> Arc<Self> {
        Arc::new(Self {
            payload: std::sync::Mutex::new(Some(payload)),
        })
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl MidtransApi for FakeMidtransApi {
    async fn fetch_status(&self, order_id: &str) -> Result<MidtransPayload> {
        self.payload
            .lock()
            .expect("fake poisoned")
            .clone()
            .ok_or_else(|| AppError::Reconcile(format!("no fixture for order {}", order_id)))
    }
}
