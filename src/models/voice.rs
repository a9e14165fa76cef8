//! Cloned and licensed voices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStatus {
    /// Samples uploaded, clone still training.
    Pending,
    Ready,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub status: VoiceStatus,
    #[serde(default)]
    pub provider_voice_id: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Presigned object-storage slot for a voice sample upload. The client
/// PUTs the audio directly to `upload_url`; the backend never proxies
/// sample bytes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUploadSlot {
    pub sample_id: String,
    pub upload_url: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}
