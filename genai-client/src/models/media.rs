//! Request and result types for the generative features.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use studio_core::error::AppError;

/// Prebuilt speech voices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    /// Male, professional.
    #[default]
    Kore,
    /// Male, energetic.
    Puck,
    /// Male, deep.
    Charon,
    /// Female, warm.
    Zephyr,
    /// Male, authoritative.
    Fenrir,
}

impl Voice {
    pub const ALL: [Voice; 5] = [
        Voice::Kore,
        Voice::Puck,
        Voice::Charon,
        Voice::Zephyr,
        Voice::Fenrir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Kore => "Kore",
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Zephyr => "Zephyr",
            Voice::Fenrir => "Fenrir",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Voice::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::InvalidRequest(format!("unknown voice: {}", s)))
    }
}

/// Requested image fidelity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageQuality {
    #[default]
    Standard,
    /// 2K output, offered to entitled users.
    High,
}

/// Image attached to a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 encoded bytes.
    pub data: String,
}

impl InlineImage {
    pub fn png(data: impl Into<String>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            data: data.into(),
        }
    }
}

/// Generated image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl GeneratedImage {
    /// `data:` URL suitable for direct display.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// A citation returned by a grounded query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

/// Text answer with the sources it was grounded on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundedAnswer {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

/// Latitude/longitude used to bias maps-grounded queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}
