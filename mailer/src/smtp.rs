//! SMTP Delivery Channel using Lettre.

use crate::MailerError;
use crate::template::{EventDetails, QR_CONTENT_ID, TicketEmail, TicketNumber};
use chrono::Utc;
use futures::future::BoxFuture;
use gatepass_core::delivery::{DeliveryChannel, DeliveryError, DeliveryId, DeliveryRequest};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// SMTP connection and sender settings
#[derive(Clone)]
pub struct SmtpSettings {
    /// SMTP server address (e.g. "smtp.gmail.com")
    pub host: String,
    /// SMTP server port (usually 587 for STARTTLS)
    pub port: u16,
    /// SMTP authentication username
    pub username: String,
    /// SMTP authentication password
    pub password: String,
    /// Sender email address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
    /// Per-command network timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Sends ticket emails over SMTP with the QR code attached inline.
///
/// The accepted message's `Message-ID` is returned as the delivery id.
///
/// # Examples
///
/// ```ignore
/// use gatepass_mailer::{SmtpChannel, SmtpSettings, EventDetails};
///
/// let channel = SmtpChannel::new(settings, EventDetails::default())?;
/// ```
#[derive(Clone)]
pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    message_id_domain: String,
    event: EventDetails,
}

impl SmtpChannel {
    /// Build the channel and its pooled transport.
    ///
    /// # Errors
    ///
    /// Returns [`MailerError::Configuration`] if the relay host or sender
    /// address is invalid.
    pub fn new(settings: SmtpSettings, event: EventDetails) -> Result<Self, MailerError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| MailerError::Configuration(format!("SMTP relay error: {e}")))?
            .port(settings.port)
            .credentials(Credentials::new(settings.username, settings.password))
            .timeout(Some(settings.timeout))
            .build();

        let sender: Mailbox = format!("{} <{}>", settings.from_name, settings.from_email)
            .parse()
            .map_err(|e| MailerError::Configuration(format!("Invalid from address: {e}")))?;

        let message_id_domain = sender.email.domain().to_string();

        Ok(Self {
            transport,
            sender,
            message_id_domain,
            event,
        })
    }

    /// Check that the server accepts a connection.
    ///
    /// # Errors
    ///
    /// Returns [`MailerError::Unreachable`] if the connection fails.
    pub async fn test_connection(&self) -> Result<(), MailerError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailerError::Unreachable("server refused connection".into())),
            Err(e) => Err(MailerError::Unreachable(e.to_string())),
        }
    }

    fn build_message(
        &self,
        request: &DeliveryRequest,
        email: &TicketEmail,
        message_id: &str,
    ) -> Result<Message, DeliveryError> {
        let recipient: Mailbox = request
            .recipient_email
            .parse()
            .map_err(|e| DeliveryError::client(format!("Invalid recipient address: {e}")))?;

        let qr = Attachment::new_inline(QR_CONTENT_ID.to_string())
            .body(request.image.png.clone(), ContentType::parse("image/png").map_err(|e| {
                DeliveryError::server(format!("Invalid attachment content type: {e}"))
            })?);

        let body = MultiPart::alternative()
            .singlepart(SinglePart::plain(email.text.clone()))
            .multipart(
                MultiPart::related()
                    .singlepart(SinglePart::html(email.html.clone()))
                    .singlepart(qr),
            );

        Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(email.subject.clone())
            .message_id(Some(message_id.to_string()))
            .multipart(body)
            .map_err(|e| DeliveryError::client(format!("Failed to build email: {e}")))
    }

    async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryId, DeliveryError> {
        let email = TicketEmail::render(
            &self.event,
            &request.display_name,
            &request.recipient_email,
            TicketNumber::generate(&self.event.ticket_prefix),
            Utc::now(),
        );
        let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), self.message_id_domain);
        let message = self.build_message(&request, &email, &message_id)?;

        tracing::info!(
            recipient = %request.recipient_email,
            ticket = email.ticket_number.as_str(),
            "Sending ticket email"
        );

        match self.transport.send(message).await {
            Ok(response) => {
                tracing::debug!(code = %response.code(), %message_id, "SMTP accepted message");
                metrics::counter!("mailer.smtp.accepted").increment(1);
                Ok(DeliveryId::new(message_id))
            },
            Err(e) => {
                metrics::counter!("mailer.smtp.failed").increment(1);
                Err(classify(&e))
            },
        }
    }
}

/// Permanent SMTP rejections (5xx) blame the request; everything else is the server's
fn classify(error: &lettre::transport::smtp::Error) -> DeliveryError {
    let message = format!("Failed to send email: {error}");
    if error.is_permanent() {
        DeliveryError::client(message)
    } else {
        DeliveryError::server(message)
    }
}

impl DeliveryChannel for SmtpChannel {
    fn send(&self, request: DeliveryRequest) -> BoxFuture<'_, Result<DeliveryId, DeliveryError>> {
        Box::pin(self.deliver(request))
    }
}

impl std::fmt::Debug for SmtpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpChannel")
            .field("sender", &self.sender.to_string())
            .field("event", &self.event.name)
            .finish_non_exhaustive()
    }
}
