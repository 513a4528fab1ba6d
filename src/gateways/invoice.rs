use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::Result,
    gateways::reference::{self, ExternalReference},
};

/// Invoice creation is an external capability: the booking flow hands a
/// pending single-payment booking (or package purchase) to an issuer and
/// gets back the order reference the gateway will echo in its webhook.
#[async_trait]
pub trait InvoiceIssuer: Send + Sync {
    async fn issue(&self, request: InvoiceRequest) -> Result<IssuedInvoice>;
}

#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub customer_id: Uuid,
    pub amount_cents: i64,
    pub description: String,
    pub reference: ExternalReference,
}

#[derive(Debug, Clone)]
pub struct IssuedInvoice {
    pub external_order_id: String,
    pub payment_url: Option<String>,
}

/// Default issuer for environments without a live gateway: mints an order
/// id, logs the request, and returns no payment URL. The encoded reference
/// matches what the webhook adapters expect back.
pub struct LoggingInvoiceIssuer;

#[async_trait]
impl InvoiceIssuer for LoggingInvoiceIssuer {
    async fn issue(&self, request: InvoiceRequest) -> Result<IssuedInvoice> {
        let external_order_id = format!("sb-{}", Uuid::new_v4());
        tracing::info!(
            customer_id = %request.customer_id,
            amount_cents = request.amount_cents,
            order_id = %external_order_id,
            reference = %reference::encode_pipe(&request.reference),
            "Issued invoice (logging issuer): {}",
            request.description
        );
        Ok(IssuedInvoice {
            external_order_id,
            payment_url: None,
        })
    }
}
