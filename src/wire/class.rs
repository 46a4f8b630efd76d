// Grounded on dylnuge-montague's dns::protocol::class::DnsClass. The top bit
// of the on-wire class field is reused by mDNS (spec 6): the cache-flush bit
// in Answer/Authority/Additional records, the "QU" unicast-response-desired
// bit in Questions. We keep that bit orthogonal to `DnsClass` itself and let
// callers (DnsQuestion, DnsResourceRecord) mask it in and out, the same way
// the teacher keeps `EdnsPayloadSize` orthogonal to the rest of the enum.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DnsClass {
    IN,
    CS,
    CH,
    HS,
    NONE,
    ANY,
}

const TOP_BIT: u16 = 0x8000;

impl DnsClass {
    pub fn from_u16(class: u16) -> Option<DnsClass> {
        match class & !TOP_BIT {
            1 => Some(DnsClass::IN),
            2 => Some(DnsClass::CS),
            3 => Some(DnsClass::CH),
            4 => Some(DnsClass::HS),
            254 => Some(DnsClass::NONE),
            255 => Some(DnsClass::ANY),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            DnsClass::IN => 1,
            DnsClass::CS => 2,
            DnsClass::CH => 3,
            DnsClass::HS => 4,
            DnsClass::NONE => 254,
            DnsClass::ANY => 255,
        }
    }

    // Splits a raw on-wire class field into (class, top bit set).
    pub fn from_wire(raw: u16) -> Option<(DnsClass, bool)> {
        Some((DnsClass::from_u16(raw)?, raw & TOP_BIT != 0))
    }

    pub fn to_wire(self, top_bit: bool) -> u16 {
        self.to_u16() | if top_bit { TOP_BIT } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_bit_round_trips() {
        let raw = DnsClass::IN.to_wire(true);
        let (class, flush) = DnsClass::from_wire(raw).expect("valid class");
        assert_eq!(class, DnsClass::IN);
        assert!(flush);

        let raw = DnsClass::IN.to_wire(false);
        let (class, flush) = DnsClass::from_wire(raw).expect("valid class");
        assert_eq!(class, DnsClass::IN);
        assert!(!flush);
    }
}
