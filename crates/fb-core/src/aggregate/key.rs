use orion_error::prelude::*;

use crate::error::{CoreReason, CoreResult};
use crate::record::FlowRecord;

/// Map key for aggregator entries. Field values joined with `\x1f`.
pub type FlowKey = String;

// ---------------------------------------------------------------------------
// KeyMask
// ---------------------------------------------------------------------------

/// Which flow fields participate in the aggregation key.
///
/// The empty mask is meaningful: it marks a collect-without-merge policy
/// where every record becomes its own entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyMask {
    pub saddr: bool,
    pub daddr: bool,
    pub proto: bool,
    pub sport: bool,
    pub dport: bool,
}

impl KeyMask {
    /// The classic default: the full five-tuple.
    pub fn full() -> Self {
        Self {
            saddr: true,
            daddr: true,
            proto: true,
            sport: true,
            dport: true,
        }
    }

    /// Build a mask from config field names.
    pub fn from_fields(fields: &[String]) -> CoreResult<Self> {
        let mut mask = Self::default();
        for field in fields {
            match field.as_str() {
                "saddr" => mask.saddr = true,
                "daddr" => mask.daddr = true,
                "proto" => mask.proto = true,
                "sport" => mask.sport = true,
                "dport" => mask.dport = true,
                other => {
                    return StructError::from(CoreReason::KeyExtraction)
                        .with_detail(format!("unknown key field {other:?}"))
                        .err();
                }
            }
        }
        Ok(mask)
    }

    pub fn is_empty(&self) -> bool {
        !(self.saddr || self.daddr || self.proto || self.sport || self.dport)
    }

    /// Whether the mask includes either address, which is what matrix-mode
    /// canonicalisation cares about.
    pub fn uses_addresses(&self) -> bool {
        self.saddr || self.daddr
    }

    fn wants_ports(&self) -> bool {
        self.sport || self.dport
    }

    /// Extract the forward key for `record`.
    ///
    /// Fails with `KeyExtraction` when the mask demands ports for a
    /// protocol that has none; the caller emits such records directly.
    pub fn key(&self, record: &FlowRecord) -> CoreResult<FlowKey> {
        if self.wants_ports() && !record.flow.proto.has_ports() {
            return StructError::from(CoreReason::KeyExtraction)
                .with_detail(format!(
                    "mask requires ports but protocol {} has none",
                    record.flow.proto,
                ))
                .err();
        }

        let mut parts: Vec<String> = Vec::with_capacity(5);
        if self.saddr {
            parts.push(record.flow.saddr.to_string());
        }
        if self.daddr {
            parts.push(record.flow.daddr.to_string());
        }
        if self.proto {
            parts.push(record.flow.proto.to_string());
        }
        if self.sport {
            parts.push(record.flow.sport.to_string());
        }
        if self.dport {
            parts.push(record.flow.dport.to_string());
        }
        Ok(parts.join("\x1f"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
