use crate::record::FlowRecord;

/// Fold `incoming` into `target`.
///
/// The merged interval is the union hull: earliest start, latest end.
/// Counters are summed with saturating arithmetic. The target's flow
/// identity and direction are authoritative; callers reverse the incoming
/// record first if its orientation disagrees. `incoming` is never mutated.
pub fn merge_into(target: &mut FlowRecord, incoming: &FlowRecord) {
    target.start_micros = target.start_micros.min(incoming.start_micros);
    target.end_micros = target.end_micros.max(incoming.end_micros);

    let t = &mut target.counters;
    let i = &incoming.counters;
    t.src_pkts = t.src_pkts.saturating_add(i.src_pkts);
    t.dst_pkts = t.dst_pkts.saturating_add(i.dst_pkts);
    t.src_bytes = t.src_bytes.saturating_add(i.src_bytes);
    t.dst_bytes = t.dst_bytes.saturating_add(i.dst_bytes);

    // Connection-state hints accumulate across merges.
    if let Some(inc) = incoming.tcp {
        let sig = target.tcp.get_or_insert_default();
        sig.saw_syn |= inc.saw_syn;
        sig.saw_syn_sent |= inc.saw_syn_sent;
        sig.established |= inc.established;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
