use fb_config::{AggregatorConfig, SortField};

use crate::aggregate::aggregator::{FlowAggregator, InsertOutcome, SweepReport};
use crate::aggregate::filter::RecordFilter;
use crate::aggregate::key::KeyMask;
use crate::error::CoreResult;
use crate::record::FlowRecord;

// ---------------------------------------------------------------------------
// ChainSpec
// ---------------------------------------------------------------------------

/// Validated shape of an aggregation chain, built once from config and
/// cloned into every bin that needs a live chain.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    pub idle_micros: i64,
    pub status_micros: i64,
    pub direction_correction: bool,
    policies: Vec<PolicySpec>,
}

#[derive(Debug, Clone)]
struct PolicySpec {
    mask: KeyMask,
    filter: Option<RecordFilter>,
    cont: bool,
}

impl ChainSpec {
    pub fn build(cfg: &AggregatorConfig) -> CoreResult<Self> {
        let mut policies = Vec::with_capacity(cfg.policies.len().max(1));
        for policy in &cfg.policies {
            policies.push(PolicySpec {
                mask: KeyMask::from_fields(&policy.key)?,
                filter: policy
                    .filter
                    .as_ref()
                    .map(RecordFilter::build)
                    .transpose()?,
                cont: policy.cont,
            });
        }
        if policies.is_empty() {
            // no policies configured: aggregate on the full five-tuple
            policies.push(PolicySpec {
                mask: KeyMask::full(),
                filter: None,
                cont: false,
            });
        }

        Ok(Self {
            idle_micros: cfg.idle_timeout.as_micros(),
            status_micros: cfg.status_timeout.as_micros(),
            // mon mode offers each record in both directions itself, so
            // reverse probing would pair a record with its own mirror
            direction_correction: cfg.direction_correction && !cfg.mon_mode,
            policies,
        })
    }

    /// Whether any policy keys on an address field. Matrix canonicalisation
    /// only makes sense when one does.
    pub fn uses_addresses(&self) -> bool {
        self.policies.iter().any(|p| p.mask.uses_addresses())
    }
}

// ---------------------------------------------------------------------------
// AggregatorChain
// ---------------------------------------------------------------------------

/// Where an offered record ended up.
#[derive(Debug)]
pub enum Disposition {
    /// At least one policy aggregated it.
    Taken,
    /// Every policy's filter rejected it.
    Dropped,
    /// A policy's mask could not key it; the caller emits it as is.
    Unkeyed(FlowRecord),
}

#[derive(Debug)]
pub struct OfferOutcome {
    pub disposition: Disposition,
    /// Records flushed ahead of a merge by status or idle timers.
    pub flushed: Vec<FlowRecord>,
}

struct ChainMember {
    filter: Option<RecordFilter>,
    cont: bool,
    agg: FlowAggregator,
}

/// An ordered walk of policy aggregators. A record goes to the first
/// member whose filter accepts it; `cont` members keep a copy and let the
/// record continue down the chain.
pub struct AggregatorChain {
    members: Vec<ChainMember>,
}

impl AggregatorChain {
    pub fn new(spec: &ChainSpec) -> Self {
        let members = spec
            .policies
            .iter()
            .map(|policy| ChainMember {
                filter: policy.filter,
                cont: policy.cont,
                agg: FlowAggregator::new(
                    policy.mask,
                    spec.idle_micros,
                    spec.status_micros,
                    spec.direction_correction,
                ),
            })
            .collect();
        Self { members }
    }

    /// Number of live entries across all members.
    pub fn len(&self) -> usize {
        self.members.iter().map(|m| m.agg.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.members.iter().all(|m| m.agg.is_empty())
    }

    /// Walk the record down the chain at arrival clock `now`.
    pub fn offer(&mut self, record: FlowRecord, now: i64) -> OfferOutcome {
        let mut flushed = Vec::new();
        let mut accepted = false;
        let mut record = Some(record);

        for member in self.members.iter_mut() {
            let Some(current) = record.take() else {
                break;
            };
            if let Some(filter) = &member.filter
                && !filter.accepts(&current)
            {
                record = Some(current);
                continue;
            }

            let keep_walking = member.cont;
            if keep_walking {
                record = Some(current.clone());
            }

            match member.agg.insert(current, now) {
                InsertOutcome::Merged { flushed: Some(f) } => {
                    flushed.push(f);
                    accepted = true;
                }
                InsertOutcome::Merged { flushed: None } | InsertOutcome::Inserted => {
                    accepted = true;
                }
                InsertOutcome::Unkeyed(rec) => {
                    return OfferOutcome {
                        disposition: Disposition::Unkeyed(rec),
                        flushed,
                    };
                }
            }

            if !keep_walking {
                break;
            }
        }

        let disposition = if accepted {
            Disposition::Taken
        } else {
            Disposition::Dropped
        };
        OfferOutcome {
            disposition,
            flushed,
        }
    }

    /// Run the timer sweep on every member, in chain order.
    pub fn sweep(&mut self, now: i64) -> SweepReport {
        let mut report = SweepReport::default();
        for member in self.members.iter_mut() {
            let part = member.agg.sweep(now);
            report.flushed.extend(part.flushed);
            report.idle_closed += part.idle_closed;
            report.status_flushed += part.status_flushed;
        }
        report
    }

    /// Drain every member, each sorted and ranked on its own.
    pub fn drain(&mut self, sort: SortField) -> Vec<FlowRecord> {
        let mut out = Vec::new();
        for member in self.members.iter_mut() {
            out.extend(member.agg.drain(sort));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
