use crate::bin::BinMode;
use crate::flowbin::FlowbinConfig;

const KEY_FIELDS: &[&str] = &["saddr", "daddr", "proto", "sport", "dport"];
const PROTO_NAMES: &[&str] = &["tcp", "udp", "icmp", "esp"];

/// Internal validation, called automatically during `FlowbinConfig::from_str` / `load`.
pub(crate) fn validate(config: &FlowbinConfig) -> anyhow::Result<()> {
    // bin mode and its parameter must agree
    match config.bin.mode {
        BinMode::Time => {
            if config.bin.span.is_none() {
                anyhow::bail!("bin.span is required when bin.mode = \"time\"");
            }
        }
        BinMode::Count => {
            if config.bin.span.is_some() {
                anyhow::bail!("bin.span is only valid with bin.mode = \"time\"");
            }
        }
        BinMode::Size => {
            if config.bin.size.is_none() {
                anyhow::bail!("bin.size is required when bin.mode = \"size\"");
            }
            if config.bin.span.is_some() {
                anyhow::bail!("bin.span is only valid with bin.mode = \"time\"");
            }
        }
        BinMode::Flow | BinMode::None => {
            if config.bin.span.is_some() || config.bin.count.is_some() || config.bin.size.is_some()
            {
                anyhow::bail!(
                    "bin.span/count/size are not valid with bin.mode = {:?}",
                    config.bin.mode,
                );
            }
        }
    }
    if config.bin.count.is_some() && config.bin.mode != BinMode::Count {
        anyhow::bail!("bin.count is only valid with bin.mode = \"count\"");
    }
    if config.bin.size.is_some() && config.bin.mode != BinMode::Size {
        anyhow::bail!("bin.size is only valid with bin.mode = \"size\"");
    }
    if config.bin.max_span == 0 {
        anyhow::bail!("bin.max_span must be > 0");
    }

    // input.rate must be a positive finite multiple
    if !(config.input.rate.is_finite() && config.input.rate > 0.0) {
        anyhow::bail!("input.rate must be > 0, got {}", config.input.rate);
    }

    // policy key fields must be known and unique
    for (i, policy) in config.aggregator.policies.iter().enumerate() {
        for field in &policy.key {
            if !KEY_FIELDS.contains(&field.as_str()) {
                anyhow::bail!(
                    "aggregator.policy[{i}]: unknown key field {field:?}, expected one of {KEY_FIELDS:?}",
                );
            }
        }
        for (j, field) in policy.key.iter().enumerate() {
            if policy.key[..j].contains(field) {
                anyhow::bail!("aggregator.policy[{i}]: duplicate key field {field:?}");
            }
        }
        if let Some(filter) = &policy.filter
            && let Some(proto) = &filter.proto
            && !is_valid_proto(proto)
        {
            anyhow::bail!(
                "aggregator.policy[{i}]: unknown filter proto {proto:?}, expected one of {PROTO_NAMES:?} or a number",
            );
        }
    }

    // runtime.channel_capacity > 0
    if config.runtime.channel_capacity == 0 {
        anyhow::bail!("runtime.channel_capacity must be > 0");
    }

    Ok(())
}

/// A protocol is a known name or a raw IP protocol number.
fn is_valid_proto(s: &str) -> bool {
    PROTO_NAMES.contains(&s.to_ascii_lowercase().as_str()) || s.parse::<u8>().is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
