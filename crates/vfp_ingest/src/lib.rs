//! Ingest layer for visitor fingerprint resolution.
//! Receives the raw payload plus request context, validates that at least one
//! mandatory signal section is present, sanitizes context strings, and
//! produces a normalized resolution request for the downstream stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn, Level};
use uuid::Uuid;

mod context;
mod payload;

pub use context::RequestContext;
pub use payload::{AdvancedSignals, BehavioralTelemetry, CoreSignals, RawFingerprintPayload};

/// Runtime configuration for ingest behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Semantic version of the ingest configuration.
    pub version: u32,
    /// Whether to strip ASCII control characters from context strings.
    pub strip_control_chars: bool,
    /// Maximum entries retained in list-valued signals (fonts, extensions).
    pub max_list_entries: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            version: 1,
            strip_control_chars: true,
            max_list_entries: 64,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.version == 0 {
            return Err(IngestError::InvalidConfig(
                "config version must be >= 1".into(),
            ));
        }
        if self.max_list_entries == 0 {
            return Err(IngestError::InvalidConfig(
                "max_list_entries must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Payload is missing both the core and advanced signal sections.
    #[error("payload carries no fingerprint signals (core and advanced both absent)")]
    MissingSignalSections,
    #[error("invalid context: {0}")]
    InvalidContext(String),
    #[error("invalid ingest config: {0}")]
    InvalidConfig(String),
}

/// Normalized request produced by ingest. This is what the resolver accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionRequest {
    pub payload: RawFingerprintPayload,
    /// Effective behavioral telemetry: the explicit argument when supplied,
    /// otherwise the payload's embedded behavioral section.
    pub telemetry: Option<BehavioralTelemetry>,
    pub context: RequestContext,
    /// Always populated: the client-supplied session id or a fresh v4 UUID.
    pub session_id: String,
    pub received_at: DateTime<Utc>,
}

/// Validate and normalize an inbound resolution call.
///
/// `telemetry` takes precedence over `payload.behavioral` when both are
/// present. `received_at` defaults to the current wall clock when `None`;
/// tests pass a fixed timestamp to stay deterministic.
pub fn ingest(
    payload: RawFingerprintPayload,
    telemetry: Option<BehavioralTelemetry>,
    context: RequestContext,
    received_at: Option<DateTime<Utc>>,
    cfg: &IngestConfig,
) -> Result<ResolutionRequest, IngestError> {
    cfg.validate()?;

    let span = tracing::span!(
        Level::INFO,
        "vfp_ingest.ingest",
        ip = %context.ip_address,
        has_session = context.session_id.is_some()
    );
    let _guard = span.enter();

    if payload.is_empty() {
        warn!("ingest_rejected_empty_payload");
        return Err(IngestError::MissingSignalSections);
    }

    let context = sanitize_context(context, cfg)?;
    let payload = normalize_payload(payload, &context, cfg);
    let telemetry = telemetry.or_else(|| payload.behavioral.clone());

    let session_id = match context.session_id.as_deref() {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => Uuid::new_v4().to_string(),
    };
    let received_at = received_at.unwrap_or_else(Utc::now);

    info!(
        session_id = %session_id,
        has_core = payload.core.is_some(),
        has_advanced = payload.advanced.is_some(),
        has_telemetry = telemetry.is_some(),
        "ingest_success"
    );

    Ok(ResolutionRequest {
        payload,
        telemetry,
        context,
        session_id,
        received_at,
    })
}

fn sanitize_context(
    context: RequestContext,
    cfg: &IngestConfig,
) -> Result<RequestContext, IngestError> {
    let user_agent = sanitize_string(&context.user_agent, cfg.strip_control_chars);
    let ip_address = sanitize_string(&context.ip_address, cfg.strip_control_chars);
    if ip_address.is_empty() {
        return Err(IngestError::InvalidContext(
            "ip_address must not be empty".into(),
        ));
    }
    Ok(RequestContext {
        user_agent,
        ip_address,
        referrer: context
            .referrer
            .map(|r| sanitize_string(&r, cfg.strip_control_chars))
            .filter(|r| !r.is_empty()),
        session_id: context
            .session_id
            .map(|s| sanitize_string(&s, cfg.strip_control_chars))
            .filter(|s| !s.is_empty()),
    })
}

/// Fill normalization gaps that belong at the boundary: the context user
/// agent backs up a missing `core.user_agent`, and oversized signal lists are
/// truncated before canonicalization ever sees them.
fn normalize_payload(
    mut payload: RawFingerprintPayload,
    context: &RequestContext,
    cfg: &IngestConfig,
) -> RawFingerprintPayload {
    if let Some(core) = payload.core.as_mut() {
        if core.user_agent.is_none() && !context.user_agent.is_empty() {
            core.user_agent = Some(context.user_agent.clone());
        }
        truncate_list(&mut core.fonts, cfg.max_list_entries);
        truncate_list(&mut core.css_features, cfg.max_list_entries);
    }
    if let Some(advanced) = payload.advanced.as_mut() {
        truncate_list(&mut advanced.extensions, cfg.max_list_entries);
    }
    payload
}

/// Cap an oversized list. Sorted and de-duplicated first so the retained
/// subset never depends on browser enumeration order.
fn truncate_list(list: &mut Option<Vec<String>>, max: usize) {
    if let Some(entries) = list.as_mut() {
        if entries.len() > max {
            entries.sort_unstable();
            entries.dedup();
            entries.truncate(max);
        }
    }
}

fn sanitize_string(value: &str, strip_control: bool) -> String {
    let trimmed = value.trim();
    if strip_control {
        trimmed.chars().filter(|c| !c.is_control()).collect()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap()
    }

    fn core_only_payload() -> RawFingerprintPayload {
        RawFingerprintPayload {
            core: Some(CoreSignals {
                canvas: Some("c1a2b3".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn empty_payload_rejected() {
        let res = ingest(
            RawFingerprintPayload::default(),
            None,
            RequestContext::new("ua", "10.0.0.1"),
            Some(fixed_now()),
            &IngestConfig::default(),
        );
        assert!(matches!(res, Err(IngestError::MissingSignalSections)));
    }

    #[test]
    fn session_id_generated_when_absent() {
        let req = ingest(
            core_only_payload(),
            None,
            RequestContext::new("ua", "10.0.0.1"),
            Some(fixed_now()),
            &IngestConfig::default(),
        )
        .expect("ingest should succeed");
        assert!(!req.session_id.is_empty());
        assert!(Uuid::parse_str(&req.session_id).is_ok());
    }

    #[test]
    fn session_id_preserved_when_supplied() {
        let mut ctx = RequestContext::new("ua", "10.0.0.1");
        ctx.session_id = Some("  sess-42  ".into());
        let req = ingest(
            core_only_payload(),
            None,
            ctx,
            Some(fixed_now()),
            &IngestConfig::default(),
        )
        .expect("ingest should succeed");
        assert_eq!(req.session_id, "sess-42");
    }

    #[test]
    fn explicit_telemetry_wins_over_embedded() {
        let mut payload = core_only_payload();
        payload.behavioral = Some(BehavioralTelemetry {
            typing_wpm: Some(30.0),
            ..Default::default()
        });
        let explicit = BehavioralTelemetry {
            typing_wpm: Some(75.0),
            ..Default::default()
        };
        let req = ingest(
            payload,
            Some(explicit),
            RequestContext::new("ua", "10.0.0.1"),
            Some(fixed_now()),
            &IngestConfig::default(),
        )
        .expect("ingest should succeed");
        assert_eq!(req.telemetry.unwrap().typing_wpm, Some(75.0));
    }

    #[test]
    fn embedded_telemetry_used_as_fallback() {
        let mut payload = core_only_payload();
        payload.behavioral = Some(BehavioralTelemetry {
            typing_wpm: Some(30.0),
            ..Default::default()
        });
        let req = ingest(
            payload,
            None,
            RequestContext::new("ua", "10.0.0.1"),
            Some(fixed_now()),
            &IngestConfig::default(),
        )
        .expect("ingest should succeed");
        assert_eq!(req.telemetry.unwrap().typing_wpm, Some(30.0));
    }

    #[test]
    fn context_user_agent_backfills_core() {
        let req = ingest(
            core_only_payload(),
            None,
            RequestContext::new("Mozilla/5.0 test", "10.0.0.1"),
            Some(fixed_now()),
            &IngestConfig::default(),
        )
        .expect("ingest should succeed");
        assert_eq!(
            req.payload.core.unwrap().user_agent.as_deref(),
            Some("Mozilla/5.0 test")
        );
    }

    #[test]
    fn control_chars_stripped_from_context() {
        let req = ingest(
            core_only_payload(),
            None,
            RequestContext::new("ua\x00evil", "10.0.0.1\x07"),
            Some(fixed_now()),
            &IngestConfig::default(),
        )
        .expect("ingest should succeed");
        assert_eq!(req.context.user_agent, "uaevil");
        assert_eq!(req.context.ip_address, "10.0.0.1");
    }

    #[test]
    fn empty_ip_rejected() {
        let res = ingest(
            core_only_payload(),
            None,
            RequestContext::new("ua", "   "),
            Some(fixed_now()),
            &IngestConfig::default(),
        );
        assert!(matches!(res, Err(IngestError::InvalidContext(_))));
    }

    #[test]
    fn oversized_lists_truncated() {
        let mut payload = core_only_payload();
        payload.core.as_mut().unwrap().fonts =
            Some((0..200).map(|i| format!("font-{i}")).collect());
        let cfg = IngestConfig {
            max_list_entries: 8,
            ..Default::default()
        };
        let req = ingest(
            payload,
            None,
            RequestContext::new("ua", "10.0.0.1"),
            Some(fixed_now()),
            &cfg,
        )
        .expect("ingest should succeed");
        assert_eq!(req.payload.core.unwrap().fonts.unwrap().len(), 8);
    }

    #[test]
    fn capped_list_subset_independent_of_enumeration_order() {
        let fonts: Vec<String> = (0..70).map(|i| format!("font-{i:02}")).collect();
        let mut reversed = fonts.clone();
        reversed.reverse();

        let ingest_with = |fonts: Vec<String>| {
            let mut payload = core_only_payload();
            payload.core.as_mut().unwrap().fonts = Some(fonts);
            ingest(
                payload,
                None,
                RequestContext::new("ua", "10.0.0.1"),
                Some(fixed_now()),
                &IngestConfig::default(),
            )
            .expect("ingest should succeed")
        };

        let forward = ingest_with(fonts);
        let backward = ingest_with(reversed);
        assert_eq!(
            forward.payload.core.unwrap().fonts,
            backward.payload.core.unwrap().fonts,
        );
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = IngestConfig {
            version: 0,
            ..Default::default()
        };
        let res = ingest(
            core_only_payload(),
            None,
            RequestContext::new("ua", "10.0.0.1"),
            Some(fixed_now()),
            &cfg,
        );
        assert!(matches!(res, Err(IngestError::InvalidConfig(_))));
    }
}
