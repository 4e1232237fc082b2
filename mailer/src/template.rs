//! HTML ticket email.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Content-ID under which the QR image is attached inline
pub const QR_CONTENT_ID: &str = "ticket-qrcode";

/// Facts about the event printed on every ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    /// Event name, also used in the subject line
    pub name: String,
    /// Human-readable dates
    pub dates: String,
    /// Venue
    pub venue: String,
    /// Opening hours
    pub hours: String,
    /// Team that signs the email
    pub organizer: String,
    /// Prefix of generated ticket numbers, e.g. `MJ25`
    pub ticket_prefix: String,
}

impl Default for EventDetails {
    fn default() -> Self {
        Self {
            name: "maJIStic 2025".to_string(),
            dates: "April 11th-12th, 2025".to_string(),
            venue: "JIS College of Engineering, Kalyani".to_string(),
            hours: "10:00 AM - 8:00 PM".to_string(),
            organizer: "maJIStic Team".to_string(),
            ticket_prefix: "MJ25".to_string(),
        }
    }
}

/// Printed ticket number: `PREFIX-NNNNNN`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketNumber(String);

impl TicketNumber {
    /// A fresh number with six random digits
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self::generate_with(prefix, &mut rand::thread_rng())
    }

    /// A fresh number drawn from `rng`
    #[must_use]
    pub fn generate_with<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> Self {
        let digits: u32 = rng.gen_range(100_000..1_000_000);
        Self(format!("{prefix}-{digits}"))
    }

    /// The number as printed
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A rendered ticket email
#[derive(Clone, Debug)]
pub struct TicketEmail {
    /// Subject line
    pub subject: String,
    /// HTML body referencing the QR image as `cid:ticket-qrcode`
    pub html: String,
    /// Plain-text alternative
    pub text: String,
    /// Number printed on the ticket
    pub ticket_number: TicketNumber,
}

impl TicketEmail {
    /// Render the email for one attendee
    #[must_use]
    pub fn render(
        event: &EventDetails,
        display_name: &str,
        recipient: &str,
        ticket_number: TicketNumber,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let name = escape_html(display_name);
        let email = escape_html(recipient);
        let event_name = escape_html(&event.name);
        let issued = issued_at.format("%d %b %Y at %H:%M UTC");
        let number = ticket_number.as_str();

        let mut html = String::with_capacity(4096);
        let _ = write!(
            html,
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Your {event_name} Ticket</title>
</head>
<body style="font-family: 'Segoe UI', Arial, sans-serif; line-height: 1.6; color: #333; background-color: #f9f9f9;">
    <div style="max-width: 600px; margin: 0 auto; border: 1px solid #ddd; border-radius: 12px; overflow: hidden;">
        <div style="padding: 35px; background-color: #ffffff;">
            <h2 style="color: #2b2d42; border-bottom: 2px solid #3498db; padding-bottom: 10px;">Your Event Ticket - CONFIRMED</h2>
            <p>Dear <strong>{name}</strong>,</p>
            <p>Thank you for registering for {event_name}! Your e-ticket is below. It confirms your participation in the event.</p>
            <div style="background-color: #f8f9fa; border: 1px solid #e9ecef; border-radius: 8px; padding: 25px; margin: 25px 0;">
                <h3 style="color: #3498db; margin-top: 0;">e-Ticket for {event_name}</h3>
                <table style="width: 100%; border-collapse: collapse;">
                    <tr><td style="font-weight: bold; width: 40%;">Name</td><td><strong>{name}</strong></td></tr>
                    <tr><td style="font-weight: bold;">Email</td><td>{email}</td></tr>
                    <tr><td style="font-weight: bold;">Ticket Number</td><td><strong>{number}</strong></td></tr>
                    <tr><td style="font-weight: bold;">Issue Date</td><td>{issued}</td></tr>
                    <tr><td style="font-weight: bold;">Ticket Status</td><td><strong style="color: #28a745">CONFIRMED</strong></td></tr>
                </table>
                <div style="text-align: center; margin: 15px 0;">
                    <img src="cid:{QR_CONTENT_ID}" alt="Ticket QR Code" style="max-width: 200px; padding: 10px; background-color: white;">
                    <div style="font-size: 18px; font-weight: bold;">{number}</div>
                </div>
            </div>
            <div style="margin: 25px 0;">
                <h4>Event Information</h4>
                <p><strong>Event:</strong> {event_name}</p>
                <p><strong>Date:</strong> {dates}</p>
                <p><strong>Venue:</strong> {venue}</p>
                <p><strong>Time:</strong> {hours}</p>
            </div>
            <ul>
                <li>Please arrive at least 30 minutes before the event starts.</li>
                <li>Keep this ticket (digital or printed) with you for entry.</li>
                <li>Present the QR code at the registration desk for check-in.</li>
                <li>This ticket is non-transferable and valid for one person only.</li>
            </ul>
            <p>Warm Regards,<br><strong>{organizer}</strong></p>
        </div>
    </div>
</body>
</html>
"#,
            dates = escape_html(&event.dates),
            venue = escape_html(&event.venue),
            hours = escape_html(&event.hours),
            organizer = escape_html(&event.organizer),
        );

        let text = format!(
            "Dear {display_name},\n\n\
             Your ticket for {event} is confirmed.\n\n\
             Ticket number: {number}\n\
             Issued: {issued}\n\
             Date: {dates}\n\
             Venue: {venue}\n\
             Time: {hours}\n\n\
             Present the attached QR code at the registration desk.\n\n\
             {organizer}\n",
            event = event.name,
            dates = event.dates,
            venue = event.venue,
            hours = event.hours,
            organizer = event.organizer,
        );

        Self {
            subject: format!("Your {} Event Ticket", event.name),
            html,
            text,
            ticket_number,
        }
    }
}

/// Escape the five HTML-significant characters
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
