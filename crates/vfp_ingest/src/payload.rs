//! Typed raw fingerprint payload.
//!
//! The browser collector submits a nested, mostly-optional structure. Every
//! field is `Option` because privacy-hardened browsers omit signals freely;
//! downstream stages apply documented sentinel defaults instead of failing.

use serde::{Deserialize, Serialize};

/// High-to-medium stability signals gathered from rendering subsystems.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoreSignals {
    /// Canvas rendering digest (hex) as produced by the collector.
    pub canvas: Option<String>,
    pub webgl_vendor: Option<String>,
    pub webgl_renderer: Option<String>,
    /// AudioContext processing digest.
    pub audio: Option<String>,
    /// Enumerated font family names; order is browser-dependent and ignored.
    pub fonts: Option<Vec<String>>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    /// IANA timezone name, e.g. `America/New_York`.
    pub timezone: Option<String>,
    /// BCP 47 language tag, e.g. `en-US`.
    pub language: Option<String>,
    pub user_agent: Option<String>,
    /// Supported CSS feature probes; order is browser-dependent and ignored.
    pub css_features: Option<Vec<String>>,
    /// Clock skew between performance.now() and Date.now(), milliseconds.
    pub timing_skew_ms: Option<f64>,
}

/// Lower-stability capability and environment signals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdvancedSignals {
    /// WebRTC-leaked local IP. Rotates on network change; never canonicalized.
    pub webrtc_local_ip: Option<String>,
    pub battery_level: Option<f64>,
    pub device_memory_gb: Option<f64>,
    pub hardware_concurrency: Option<u32>,
    pub network_rtt_ms: Option<f64>,
    /// Detected extension/plugin identifiers; order is ignored.
    pub extensions: Option<Vec<String>>,
    pub local_storage: Option<bool>,
    pub session_storage: Option<bool>,
    pub touch_points: Option<u32>,
}

/// Interaction telemetry summarized client-side over the current session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehavioralTelemetry {
    pub typing_wpm: Option<f64>,
    /// Keystroke interval consistency ratio in [0, 1]; 1 is perfectly even.
    pub typing_rhythm: Option<f64>,
    /// Mean pointer velocity in px/s.
    pub pointer_velocity: Option<f64>,
    /// Digest of click positioning pattern.
    pub click_pattern: Option<String>,
    /// Digest of scroll behavior pattern.
    pub scroll_pattern: Option<String>,
    pub session_duration_secs: Option<f64>,
    pub interaction_count: Option<u32>,
    pub keyboard_language: Option<String>,
    /// Viewport resolution the visitor settles on, e.g. `1920x1080`.
    pub preferred_resolution: Option<String>,
    pub timezone: Option<String>,
    /// Local hour of day (0-23) the session started in.
    pub active_hour: Option<u8>,
}

/// The inbound fingerprint payload, owned transiently by one resolution
/// request. Never persisted verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawFingerprintPayload {
    pub core: Option<CoreSignals>,
    pub advanced: Option<AdvancedSignals>,
    pub behavioral: Option<BehavioralTelemetry>,
}

impl RawFingerprintPayload {
    /// True when neither mandatory signal section is present.
    pub fn is_empty(&self) -> bool {
        self.core.is_none() && self.advanced.is_none()
    }
}
