use num_derive::FromPrimitive;

// Grounded on dylnuge-montague's dns::protocol::rrtype::DnsRRType, trimmed to
// the set spec 6 ("Record types recognised") calls out: A, AAAA, PTR, SRV,
// TXT, NSEC are fully modeled; CNAME, NS, MX are read-only extensions (we
// decode them but the responder never originates them); ANY is query-only.
#[derive(FromPrimitive, Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum DnsRRType {
    A = 1,
    NS = 2,
    CNAME = 5,
    SOA = 6,
    PTR = 12,
    MX = 15,
    TXT = 16,
    AAAA = 28,
    SRV = 33,
    NSEC = 47,
    ANY = 255,
}

impl DnsRRType {
    // Authoritative record types the responder itself can own (spec 3,
    // "rdata variant"). NSEC is derived, not independently authored, but is
    // still an authoritative type for probing/Find purposes.
    pub fn is_authoritative_capable(self) -> bool {
        matches!(
            self,
            DnsRRType::A
                | DnsRRType::AAAA
                | DnsRRType::PTR
                | DnsRRType::SRV
                | DnsRRType::TXT
                | DnsRRType::NSEC
        )
    }

    // Spec 3: UNIQUE (cache-flush / requires probing) applies to A, AAAA,
    // SRV, TXT; PTR and NSEC are shared records.
    pub fn is_unique_by_default(self) -> bool {
        matches!(
            self,
            DnsRRType::A | DnsRRType::AAAA | DnsRRType::SRV | DnsRRType::TXT
        )
    }
}
