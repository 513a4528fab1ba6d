use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    config::SmtpConfig,
    error::{AppError, Result},
    notify::{Notification, NotificationSink, Template},
};

/// SMTP sink. Customer contact details live outside this system, so mail
/// goes to the configured operations inbox with the customer id in the
/// body; the front-of-house tooling takes it from there.
pub struct EmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    recipient: String,
    enabled: bool,
}

impl EmailSink {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AppError::Internal(format!("SMTP relay setup failed: {}", e)))?;
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
            recipient: config.ops_recipient.clone(),
            enabled: config.enabled,
        })
    }

    fn subject_for(template: Template) -> &'static str {
        match template {
            Template::BookingConfirmed => "Booking confirmed",
            Template::BookingCancelled => "Booking cancelled",
            Template::WaitlistSlotOpen => "A waitlist spot opened",
            Template::PackageActivated => "Package activated",
        }
    }

    fn render(notification: &Notification) -> String {
        let mut body = format!(
            "Template: {}\nCustomer: {}\n",
            notification.template.name(),
            notification.customer_id
        );
        for (key, value) in &notification.fields {
            body.push_str(key);
            body.push_str(": ");
            body.push_str(value);
            body.push('\n');
        }
        body
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| AppError::Internal(format!("Bad from address: {}", e)))?,
            )
            .to(self
                .recipient
                .parse()
                .map_err(|e| AppError::Internal(format!("Bad recipient address: {}", e)))?)
            .subject(Self::subject_for(notification.template))
            .header(ContentType::TEXT_PLAIN)
            .body(Self::render(notification))
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::External(format!("SMTP send failed: {}", e)))?;

        Ok(())
    }
}
