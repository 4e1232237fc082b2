//! Ticket payload and the rendered image that carries it.

use crate::attendee::AttendeeRecord;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Substituted for any identity field the record does not have
pub const PLACEHOLDER: &str = "N/A";

/// Errors building a [`TicketPayload`]
#[derive(Error, Debug)]
pub enum PayloadError {
    /// The record has neither a store id nor an email, so a scanned code
    /// could not be matched back to anyone
    #[error("record has neither an identifier nor an email")]
    MissingIdentity,

    /// JSON serialization failed
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image text is not a base64 PNG
    #[error("invalid ticket image: {0}")]
    InvalidImage(String),
}

/// Data embedded in a scannable ticket.
///
/// Field order is fixed (`id`, `name`, `email`, `jis_id`) and absent values are
/// [`PLACEHOLDER`], so the same record always produces the same JSON text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPayload {
    /// Store identifier rendered as a string
    pub id: String,
    /// Display name
    pub name: String,
    /// Recipient address
    pub email: String,
    /// Institutional identifier
    pub jis_id: String,
}

impl TicketPayload {
    /// Derive the payload for `record`.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::MissingIdentity`] when the record has no id and no email.
    pub fn from_record(record: &AttendeeRecord) -> Result<Self, PayloadError> {
        if record.id.is_none() && record.email.is_none() {
            return Err(PayloadError::MissingIdentity);
        }

        let or_placeholder =
            |value: Option<&str>| value.map_or_else(|| PLACEHOLDER.to_string(), str::to_string);

        let name = record.name.trim();

        Ok(Self {
            id: record
                .id
                .map_or_else(|| PLACEHOLDER.to_string(), |id| id.to_string()),
            name: if name.is_empty() {
                PLACEHOLDER.to_string()
            } else {
                name.to_string()
            },
            email: or_placeholder(record.email.as_deref()),
            jis_id: or_placeholder(record.institution_id.as_deref()),
        })
    }

    /// Canonical JSON text of the payload
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Serialization`] if JSON encoding fails.
    pub fn to_json(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse payload text read back from a scanned code
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Serialization`] if the text is not a payload.
    pub fn from_json(text: &str) -> Result<Self, PayloadError> {
        Ok(serde_json::from_str(text)?)
    }
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// A rendered PNG image
#[derive(Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    /// PNG-encoded bytes
    pub png: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageArtifact {
    /// Base64 of the PNG bytes (standard alphabet, padded)
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }

    /// `data:image/png;base64,...` URL for embedding in JSON or HTML
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.to_base64())
    }

    /// Decode a PNG from a data URL or bare base64 text, reading the pixel
    /// dimensions from its header
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::InvalidImage`] if the text is not base64 or the
    /// bytes are not a PNG.
    pub fn from_data_url(text: &str) -> Result<Self, PayloadError> {
        let encoded = text
            .split_once(";base64,")
            .map_or(text, |(_, data)| data)
            .trim();
        let png = STANDARD
            .decode(encoded)
            .map_err(|e| PayloadError::InvalidImage(e.to_string()))?;

        // Signature, then the IHDR chunk: length, type, width, height
        if png.len() < 24 || png[..8] != PNG_SIGNATURE || &png[12..16] != b"IHDR" {
            return Err(PayloadError::InvalidImage("not a PNG image".to_string()));
        }
        let dimension =
            |at: usize| u32::from_be_bytes([png[at], png[at + 1], png[at + 2], png[at + 3]]);
        let (width, height) = (dimension(16), dimension(20));

        Ok(Self { png, width, height })
    }
}

impl std::fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}
