//! Request context accompanying a resolution call.

use serde::{Deserialize, Serialize};

/// Per-request HTTP context supplied by the caller. Consent and privacy flags
/// are carried through untouched; this core never interprets them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RequestContext {
    pub user_agent: String,
    pub ip_address: String,
    pub referrer: Option<String>,
    /// Client-supplied session identifier. When absent or blank, ingest
    /// allocates a fresh one.
    pub session_id: Option<String>,
}

impl RequestContext {
    pub fn new(user_agent: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ip_address: ip_address.into(),
            referrer: None,
            session_id: None,
        }
    }
}
