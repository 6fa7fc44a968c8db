use fb_config::FilterConfig;
use orion_error::prelude::*;

use crate::error::{CoreReason, CoreResult};
use crate::record::{FlowRecord, Proto};

/// Structural record filter attached to a policy. All present conditions
/// must hold for the filter to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFilter {
    proto: Option<Proto>,
    /// Matches either endpoint's port.
    port: Option<u16>,
}

impl RecordFilter {
    pub fn build(cfg: &FilterConfig) -> CoreResult<Self> {
        let proto = match &cfg.proto {
            Some(name) => Some(
                name.parse::<Proto>()
                    .map_err(|e| {
                        StructError::from(CoreReason::KeyExtraction).with_detail(e.to_string())
                    })?,
            ),
            None => None,
        };
        Ok(Self {
            proto,
            port: cfg.port,
        })
    }

    pub fn accepts(&self, record: &FlowRecord) -> bool {
        if let Some(proto) = self.proto
            && record.flow.proto != proto
        {
            return false;
        }
        if let Some(port) = self.port
            && record.flow.sport != port
            && record.flow.dport != port
        {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
