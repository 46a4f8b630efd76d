// Resource record runtime state (spec 3, "Resource Record (RR)").

use crate::cache::pool::StringId;
use crate::wire::{DnsClass, DnsRRType};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RrId(pub(crate) usize);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RrState {
    Invalid,
    Probing,
    Announcing,
    Valid,
    Goodbye,
    Suspended,
    Query,
    Updating,
    Delete,
    PoofDelete,
}

// spec 3's "flags bitset". Kept as named bools, matching the way
// `DnsFlags` represents the wire header bits: each flag is independently
// meaningful and the struct is small enough that a bitset buys nothing.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct RrFlags {
    pub peer: bool,
    pub unique: bool,
    pub continuous_query: bool,
    pub duplicate_query: bool,
    pub updating: bool,
    pub answer: bool,
    pub additional: bool,
    pub known_answer: bool,
    pub authority_answer: bool,
    pub delete: bool,
}

#[derive(Clone, PartialEq, Debug)]
pub enum RdataVariant {
    A(std::net::Ipv4Addr),
    Aaaa(std::net::Ipv6Addr),
    Ptr(StringId),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: StringId,
    },
    Txt(StringId),
    Nsec {
        next_name: StringId,
        window: u8,
        bitmap: Vec<u8>,
    },
}

impl RdataVariant {
    pub fn rr_type(&self) -> DnsRRType {
        match self {
            RdataVariant::A(_) => DnsRRType::A,
            RdataVariant::Aaaa(_) => DnsRRType::AAAA,
            RdataVariant::Ptr(_) => DnsRRType::PTR,
            RdataVariant::Srv { .. } => DnsRRType::SRV,
            RdataVariant::Txt(_) => DnsRRType::TXT,
            RdataVariant::Nsec { .. } => DnsRRType::NSEC,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Record {
    pub interface: u32,
    pub name: StringId,
    pub class: DnsClass,
    pub state: RrState,
    pub flags: RrFlags,

    pub ttl: u32,
    // Ticks remaining before expiry; `None` means the record is above the
    // timer horizon (authoritative records with no TTL-driven expiry).
    pub remaining_ticks: Option<u32>,
    pub timer_count: u32,
    pub response_interval: u32,

    pub retransmit_count: u32,
    pub retransmit_lifetime: u32,
    pub announcing_max_time: u32,
    pub conflict_count: u32,
    pub poof_count: u32,
    pub response_send_flag: bool,

    pub rdata: RdataVariant,
    pub elapsed_time: u32,

    // Meta-PTR reference count (spec 4.3, "special case").
    pub count: u32,
}

impl Record {
    pub fn rr_type(&self) -> DnsRRType {
        self.rdata.rr_type()
    }
}
