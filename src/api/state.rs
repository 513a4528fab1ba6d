use std::sync::Arc;

use crate::{config::Settings, gateways::PaymentGateway, service::ServiceContext};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
    pub midtrans: Option<Arc<dyn PaymentGateway>>,
    pub xendit: Option<Arc<dyn PaymentGateway>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        service_context: Arc<ServiceContext>,
        midtrans: Option<Arc<dyn PaymentGateway>>,
        xendit: Option<Arc<dyn PaymentGateway>>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            service_context,
            midtrans,
            xendit,
            settings,
        }
    }
}
