use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studiobook::{
    api,
    config::Settings,
    gateways::{
        midtrans::HttpMidtransApi, LoggingInvoiceIssuer, MidtransGateway, PaymentGateway,
        XenditGateway,
    },
    notify::{email::EmailSink, NotificationManager},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studiobook=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!(
        "Starting studiobook server on {}:{}",
        settings.server.host,
        settings.server.port
    );

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    // Notification sinks are fire-and-forget; a misconfigured sink is a
    // warning, not a startup failure.
    let notifier = Arc::new(NotificationManager::new());
    if settings.smtp.enabled {
        match EmailSink::new(&settings.smtp) {
            Ok(sink) => notifier.register(Arc::new(sink)).await,
            Err(e) => tracing::warn!("Email sink disabled: {:?}", e),
        }
    }

    let service_context = Arc::new(ServiceContext::new(
        db_pool.clone(),
        Arc::new(LoggingInvoiceIssuer),
        notifier.clone(),
    ));

    // Gateways come up only when configured; webhooks for a disabled
    // gateway answer 503.
    let midtrans: Option<Arc<dyn PaymentGateway>> = if settings.midtrans.enabled {
        match (&settings.midtrans.server_key, &settings.midtrans.api_base_url) {
            (Some(server_key), Some(base_url)) => {
                tracing::info!("Midtrans gateway enabled");
                let api = Arc::new(HttpMidtransApi::new(
                    base_url.clone(),
                    server_key.clone(),
                )?);
                Some(Arc::new(MidtransGateway::new(server_key.clone(), api)))
            }
            _ => {
                tracing::warn!("Midtrans enabled but missing configuration");
                None
            }
        }
    } else {
        tracing::info!("Midtrans gateway disabled");
        None
    };

    let xendit: Option<Arc<dyn PaymentGateway>> = if settings.xendit.enabled {
        match &settings.xendit.callback_token {
            Some(token) => {
                tracing::info!("Xendit gateway enabled");
                Some(Arc::new(XenditGateway::new(token.clone())))
            }
            None => {
                tracing::warn!("Xendit enabled but missing configuration");
                None
            }
        }
    } else {
        tracing::info!("Xendit gateway disabled");
        None
    };

    let app = api::create_app(service_context, midtrans, xendit, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        settings.server.host, settings.server.port
    ))
    .await?;

    tracing::info!(
        "Server listening on http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
