use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Proto
// ---------------------------------------------------------------------------

/// IP protocol of a flow. Unrecognised protocols keep their raw number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proto {
    Tcp,
    Udp,
    Icmp,
    Esp,
    Other(u8),
}

impl Proto {
    pub fn number(&self) -> u8 {
        match self {
            Proto::Tcp => 6,
            Proto::Udp => 17,
            Proto::Icmp => 1,
            Proto::Esp => 50,
            Proto::Other(n) => *n,
        }
    }

    /// Whether the port pair carries transport semantics worth probing in
    /// the reverse direction. ESP flows are unidirectional by SPI.
    pub fn supports_reverse(&self) -> bool {
        !matches!(self, Proto::Esp)
    }

    /// Whether the port pair is meaningful for this protocol. ICMP reuses
    /// the port fields for type/code.
    pub fn has_ports(&self) -> bool {
        matches!(self, Proto::Tcp | Proto::Udp | Proto::Icmp)
    }
}

impl FromStr for Proto {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Proto::Tcp),
            "udp" => Ok(Proto::Udp),
            "icmp" => Ok(Proto::Icmp),
            "esp" => Ok(Proto::Esp),
            other => {
                let n: u8 = other
                    .parse()
                    .map_err(|_| anyhow::anyhow!("unknown protocol {s:?}"))?;
                Ok(match n {
                    6 => Proto::Tcp,
                    17 => Proto::Udp,
                    1 => Proto::Icmp,
                    50 => Proto::Esp,
                    n => Proto::Other(n),
                })
            }
        }
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proto::Tcp => write!(f, "tcp"),
            Proto::Udp => write!(f, "udp"),
            Proto::Icmp => write!(f, "icmp"),
            Proto::Esp => write!(f, "esp"),
            Proto::Other(n) => write!(f, "{n}"),
        }
    }
}

impl Serialize for Proto {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Proto {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Orientation of a record relative to its original capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Reversed,
}

impl Direction {
    pub fn flipped(&self) -> Direction {
        match self {
            Direction::Forward => Direction::Reversed,
            Direction::Reversed => Direction::Forward,
        }
    }
}

// ---------------------------------------------------------------------------
// FlowTuple
// ---------------------------------------------------------------------------

/// The five-tuple identifying a flow. For ICMP, `sport`/`dport` carry the
/// message type and code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FlowTuple {
    pub saddr: IpAddr,
    pub daddr: IpAddr,
    pub sport: u16,
    pub dport: u16,
    pub proto: Proto,
}

impl FlowTuple {
    pub fn reversed(&self) -> FlowTuple {
        FlowTuple {
            saddr: self.daddr,
            daddr: self.saddr,
            sport: self.dport,
            dport: self.sport,
            proto: self.proto,
        }
    }

    /// Endpoint ordering for matrix mode: the numerically smaller address
    /// is the canonical source. `IpAddr` ordering compares IPv4 numerically
    /// and IPv6 segment-wise, with all IPv4 below IPv6.
    pub fn src_is_canonical(&self) -> bool {
        self.saddr <= self.daddr
    }

    /// Orientation-insensitive form of the tuple, used by flow-mode binning
    /// so both directions land in the same bin.
    pub fn canonical(&self) -> FlowTuple {
        if self.src_is_canonical() {
            *self
        } else {
            self.reversed()
        }
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Per-direction packet and byte counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Counters {
    #[serde(default)]
    pub src_pkts: u64,
    #[serde(default)]
    pub dst_pkts: u64,
    #[serde(default)]
    pub src_bytes: u64,
    #[serde(default)]
    pub dst_bytes: u64,
}

impl Counters {
    pub fn total_pkts(&self) -> u64 {
        self.src_pkts.saturating_add(self.dst_pkts)
    }

    pub fn total_bytes(&self) -> u64 {
        self.src_bytes.saturating_add(self.dst_bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.total_pkts() == 0
    }

    pub fn swapped(&self) -> Counters {
        Counters {
            src_pkts: self.dst_pkts,
            dst_pkts: self.src_pkts,
            src_bytes: self.dst_bytes,
            dst_bytes: self.src_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// TcpSignals
// ---------------------------------------------------------------------------

/// Connection-state hints used by the aggregator's direction tie-breaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpSignals {
    /// A SYN was seen from the recorded source.
    pub saw_syn: bool,
    /// A SYN was sent but the handshake had not completed.
    pub saw_syn_sent: bool,
    pub established: bool,
}

// ---------------------------------------------------------------------------
// IcmpKind
// ---------------------------------------------------------------------------

/// ICMP message kinds the aggregator can pair across directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IcmpKind {
    Echo,
    EchoReply,
    RouterAdvert,
    RouterSolicit,
    Timestamp,
    TimestampReply,
    InfoRequest,
    InfoReply,
    MaskRequest,
    MaskReply,
}

impl IcmpKind {
    /// On-the-wire ICMP type number; records carry it in `sport`.
    pub fn wire_type(&self) -> u8 {
        match self {
            IcmpKind::Echo => 8,
            IcmpKind::EchoReply => 0,
            IcmpKind::RouterAdvert => 9,
            IcmpKind::RouterSolicit => 10,
            IcmpKind::Timestamp => 13,
            IcmpKind::TimestampReply => 14,
            IcmpKind::InfoRequest => 15,
            IcmpKind::InfoReply => 16,
            IcmpKind::MaskRequest => 17,
            IcmpKind::MaskReply => 18,
        }
    }

    /// The message kind a response to this kind would carry, when the kind
    /// participates in a request/reply exchange.
    pub fn reply_pair(&self) -> Option<IcmpKind> {
        match self {
            IcmpKind::Echo => Some(IcmpKind::EchoReply),
            IcmpKind::EchoReply => Some(IcmpKind::Echo),
            IcmpKind::RouterAdvert => Some(IcmpKind::RouterSolicit),
            IcmpKind::RouterSolicit => Some(IcmpKind::RouterAdvert),
            IcmpKind::Timestamp => Some(IcmpKind::TimestampReply),
            IcmpKind::TimestampReply => Some(IcmpKind::Timestamp),
            IcmpKind::InfoRequest => Some(IcmpKind::InfoReply),
            IcmpKind::InfoReply => Some(IcmpKind::InfoRequest),
            IcmpKind::MaskRequest => Some(IcmpKind::MaskReply),
            IcmpKind::MaskReply => Some(IcmpKind::MaskRequest),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowRecord
// ---------------------------------------------------------------------------

/// One flow status record: a half-open interval `[start, end)` of observed
/// activity plus its counters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlowRecord {
    pub start_micros: i64,
    pub end_micros: i64,
    pub flow: FlowTuple,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpSignals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp: Option<IcmpKind>,
    /// Set once the record has been handed to the output sink. Never
    /// serialised; a re-read record starts a fresh reporting period.
    #[serde(skip)]
    pub written: bool,
    /// Position within the record's bin, assigned at drain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
}

impl FlowRecord {
    pub fn duration_micros(&self) -> i64 {
        self.end_micros - self.start_micros
    }

    /// The record as seen from the opposite direction: endpoints, ports and
    /// per-direction counters swapped, orientation flipped. Applying it
    /// twice yields the original record.
    pub fn reverse(&self) -> FlowRecord {
        FlowRecord {
            flow: self.flow.reversed(),
            counters: self.counters.swapped(),
            direction: self.direction.flipped(),
            ..self.clone()
        }
    }

    /// A copy with counters cleared and the interval collapsed to its end,
    /// opening a fresh reporting period for the same flow.
    pub fn zeroed(&self) -> FlowRecord {
        FlowRecord {
            counters: Counters::default(),
            start_micros: self.end_micros,
            written: false,
            rank: None,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
