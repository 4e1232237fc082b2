//! QR Payload Encoder.
//!
//! Turns an attendee record into a PNG QR code carrying the canonical
//! [`TicketPayload`] JSON at error-correction level H.

use gatepass_core::attendee::AttendeeRecord;
use gatepass_core::payload::{ImageArtifact, PayloadError, TicketPayload};
use image::{GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};
use std::io::Cursor;
use thiserror::Error;

const DARK: Luma<u8> = Luma([0]);
const LIGHT: Luma<u8> = Luma([255]);

/// Errors producing a ticket image
#[derive(Error, Debug)]
pub enum EncodeError {
    /// The record cannot produce a usable payload
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// PNG encoding failed
    #[error("image encoding failed: {0}")]
    Render(String),
}

impl From<PayloadError> for EncodeError {
    fn from(err: PayloadError) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Renders ticket payloads as QR code images.
///
/// Pure: the same record always yields the same PNG bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QrEncoder {
    target_width: u32,
    margin_modules: u32,
}

impl Default for QrEncoder {
    fn default() -> Self {
        Self::new(300, 2)
    }
}

impl QrEncoder {
    /// Encoder aiming for `target_width` pixels with a quiet zone of
    /// `margin_modules` modules on each side
    #[must_use]
    pub const fn new(target_width: u32, margin_modules: u32) -> Self {
        Self {
            target_width,
            margin_modules,
        }
    }

    /// Encode `record` into a QR code image.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidPayload`] when the record has neither id
    /// nor email, or the payload does not fit in a QR symbol.
    pub fn encode(&self, record: &AttendeeRecord) -> Result<ImageArtifact, EncodeError> {
        let json = TicketPayload::from_record(record)?.to_json()?;
        self.encode_text(&json)
    }

    /// Encode arbitrary text with the encoder's geometry
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidPayload`] if the text does not fit.
    pub fn encode_text(&self, text: &str) -> Result<ImageArtifact, EncodeError> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::H)
            .map_err(|e| EncodeError::InvalidPayload(e.to_string()))?;

        let image = self.rasterize(&code)?;
        let (width, height) = image.dimensions();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| EncodeError::Render(e.to_string()))?;

        Ok(ImageArtifact { png, width, height })
    }

    fn rasterize(&self, code: &QrCode) -> Result<GrayImage, EncodeError> {
        let modules = u32::try_from(code.width())
            .map_err(|_| EncodeError::InvalidPayload("symbol too large".into()))?;
        let span = modules + 2 * self.margin_modules;
        let scale = (self.target_width / span).max(1);
        let side = span * scale;
        let offset = self.margin_modules * scale;

        let mut image = GrayImage::from_pixel(side, side, LIGHT);
        for (index, color) in code.to_colors().into_iter().enumerate() {
            if color != Color::Dark {
                continue;
            }
            let index = u32::try_from(index)
                .map_err(|_| EncodeError::InvalidPayload("symbol too large".into()))?;
            let x0 = offset + (index % modules) * scale;
            let y0 = offset + (index / modules) * scale;
            for y in y0..y0 + scale {
                for x in x0..x0 + scale {
                    image.put_pixel(x, y, DARK);
                }
            }
        }

        Ok(image)
    }
}
