//! Probe endpoint identity
//!
//! A machine is identified by its host name together with the zone
//! (datacenter) it lives in. Both parts are significant for equality, so the
//! same host listed under two zones yields two distinct matrix keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens reserved by the baseline line grammar
pub const RESERVED_TOKENS: [&str; 3] = ["|", "->", " : "];

/// Identity of one probe endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId {
    /// Host name or address used to reach the machine
    pub host: String,

    /// Datacenter or zone the machine belongs to
    #[serde(alias = "datacenter")]
    pub zone: String,
}

impl MachineId {
    pub fn new(host: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            zone: zone.into(),
        }
    }

    /// Return the first reserved token found in host or zone, if any
    pub fn reserved_token(&self) -> Option<&'static str> {
        RESERVED_TOKENS
            .iter()
            .find(|token| self.host.contains(*token) || self.zone.contains(*token))
            .copied()
    }

    /// Header label used by the report: `zone [host]`, or just the zone
    pub fn label(&self, zone_only: bool) -> String {
        if zone_only {
            self.zone.clone()
        } else {
            format!("{} [{}]", self.zone, self.host)
        }
    }
}

/// Renders as `host|zone`, the form used in baseline files
impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.host, self.zone)
    }
}
