use std::net::{Ipv4Addr, Ipv6Addr};

use super::{bigendians, names, txt, DnsFormatError, DnsRRType};

// Grounded on dylnuge-montague's dns::protocol::rdata::DnsRecordData, with
// the variants spec 3 ("rdata variant") and spec 6 ("read-only extensions")
// require: A, AAAA, PTR, SRV, TXT, NSEC are fully modeled; CNAME, NS, MX
// decode but the responder never originates them.
#[derive(Clone, PartialEq, Debug)]
pub enum DnsRecordData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    PTR(Vec<String>),
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: Vec<String>,
    },
    TXT(String),
    NSEC {
        next_name: Vec<String>,
        window: u8,
        bitmap: Vec<u8>,
    },
    CNAME(Vec<String>),
    NS(Vec<String>),
    MX {
        preference: u16,
        exchange: Vec<String>,
    },
    Other(Vec<u8>),
}

impl DnsRecordData {
    pub fn rr_type(&self) -> DnsRRType {
        match self {
            DnsRecordData::A(_) => DnsRRType::A,
            DnsRecordData::AAAA(_) => DnsRRType::AAAA,
            DnsRecordData::PTR(_) => DnsRRType::PTR,
            DnsRecordData::SRV { .. } => DnsRRType::SRV,
            DnsRecordData::TXT(_) => DnsRRType::TXT,
            DnsRecordData::NSEC { .. } => DnsRRType::NSEC,
            DnsRecordData::CNAME(_) => DnsRRType::CNAME,
            DnsRecordData::NS(_) => DnsRRType::NS,
            DnsRecordData::MX { .. } => DnsRRType::MX,
            // `Other` never round-trips a type; callers that hit this arm
            // already know the rr_type from the header they parsed it with.
            DnsRecordData::Other(_) => DnsRRType::ANY,
        }
    }

    pub fn from_bytes(
        packet_bytes: &[u8],
        pos: usize,
        rr_type: DnsRRType,
        rd_length: u16,
    ) -> Result<DnsRecordData, DnsFormatError> {
        let rd_length = rd_length as usize;
        if pos + rd_length > packet_bytes.len() {
            return Err(DnsFormatError::make_error("rdata runs past end of packet"));
        }
        let record_bytes = &packet_bytes[pos..pos + rd_length];

        let record = match rr_type {
            DnsRRType::A => {
                if rd_length != 4 {
                    return Err(DnsFormatError::make_error("A record rdata was not 4 bytes"));
                }
                DnsRecordData::A(Ipv4Addr::new(
                    record_bytes[0],
                    record_bytes[1],
                    record_bytes[2],
                    record_bytes[3],
                ))
            }
            DnsRRType::AAAA => {
                if rd_length != 16 {
                    return Err(DnsFormatError::make_error("AAAA record rdata was not 16 bytes"));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(record_bytes);
                DnsRecordData::AAAA(Ipv6Addr::from(octets))
            }
            DnsRRType::PTR => {
                let (name, _) = names::deserialize_name(packet_bytes, pos)?;
                DnsRecordData::PTR(name)
            }
            DnsRRType::NS => {
                let (name, _) = names::deserialize_name(packet_bytes, pos)?;
                DnsRecordData::NS(name)
            }
            DnsRRType::CNAME => {
                let (name, _) = names::deserialize_name(packet_bytes, pos)?;
                DnsRecordData::CNAME(name)
            }
            DnsRRType::MX => {
                if rd_length < 2 {
                    return Err(DnsFormatError::make_error("MX record rdata too short"));
                }
                let preference = bigendians::to_u16(&record_bytes[0..2]);
                let (exchange, _) = names::deserialize_name(packet_bytes, pos + 2)?;
                DnsRecordData::MX { preference, exchange }
            }
            DnsRRType::SRV => {
                if rd_length < 6 {
                    return Err(DnsFormatError::make_error("SRV record rdata too short"));
                }
                let priority = bigendians::to_u16(&record_bytes[0..2]);
                let weight = bigendians::to_u16(&record_bytes[2..4]);
                let port = bigendians::to_u16(&record_bytes[4..6]);
                let (target, _) = names::deserialize_name(packet_bytes, pos + 6)?;
                DnsRecordData::SRV {
                    priority,
                    weight,
                    port,
                    target,
                }
            }
            DnsRRType::TXT => DnsRecordData::TXT(txt::decode(record_bytes)?),
            DnsRRType::NSEC => {
                let (next_name, name_end) = names::deserialize_name(packet_bytes, pos)?;
                let bitmap_start = name_end - pos;
                if bitmap_start + 2 > record_bytes.len() {
                    return Err(DnsFormatError::make_error("NSEC bitmap window header truncated"));
                }
                let window = record_bytes[bitmap_start];
                let bitmap_len = record_bytes[bitmap_start + 1] as usize;
                let bitmap_begin = bitmap_start + 2;
                if bitmap_begin + bitmap_len > record_bytes.len() {
                    return Err(DnsFormatError::make_error("NSEC bitmap runs past rdata"));
                }
                DnsRecordData::NSEC {
                    next_name,
                    window,
                    bitmap: record_bytes[bitmap_begin..bitmap_begin + bitmap_len].to_vec(),
                }
            }
            _ => DnsRecordData::Other(record_bytes.to_vec()),
        };

        Ok(record)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DnsFormatError> {
        let bytes = match self {
            DnsRecordData::A(ip) => ip.octets().to_vec(),
            DnsRecordData::AAAA(ip) => ip.octets().to_vec(),
            DnsRecordData::PTR(name) => names::serialize_name(name)?,
            DnsRecordData::NS(name) => names::serialize_name(name)?,
            DnsRecordData::CNAME(name) => names::serialize_name(name)?,
            DnsRecordData::MX { preference, exchange } => {
                let mut bytes = bigendians::from_u16(*preference).to_vec();
                bytes.extend_from_slice(&names::serialize_name(exchange)?);
                bytes
            }
            DnsRecordData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                let mut bytes = Vec::with_capacity(6);
                bytes.extend_from_slice(&bigendians::from_u16(*priority));
                bytes.extend_from_slice(&bigendians::from_u16(*weight));
                bytes.extend_from_slice(&bigendians::from_u16(*port));
                bytes.extend_from_slice(&names::serialize_name(target)?);
                bytes
            }
            DnsRecordData::TXT(kv) => txt::encode(kv)?,
            DnsRecordData::NSEC {
                next_name,
                window,
                bitmap,
            } => {
                let mut bytes = names::serialize_name(next_name)?;
                bytes.push(*window);
                bytes.push(bitmap.len() as u8);
                bytes.extend_from_slice(bitmap);
                bytes
            }
            DnsRecordData::Other(raw) => raw.clone(),
        };
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_record_round_trips() {
        let record = DnsRecordData::A(Ipv4Addr::new(1, 2, 3, 4));
        let bytes = record.to_bytes().unwrap();
        let mut packet = vec![0u8; 0];
        packet.extend_from_slice(&bytes);
        let decoded =
            DnsRecordData::from_bytes(&packet, 0, DnsRRType::A, bytes.len() as u16).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn srv_round_trips_with_name_in_rest_of_packet() {
        let record = DnsRecordData::SRV {
            priority: 0,
            weight: 0,
            port: 80,
            target: vec!["host".to_owned(), "local".to_owned()],
        };
        let mut packet = vec![0u8; 4];
        let bytes = record.to_bytes().unwrap();
        packet.extend_from_slice(&bytes);
        let decoded =
            DnsRecordData::from_bytes(&packet, 4, DnsRRType::SRV, bytes.len() as u16).unwrap();
        assert_eq!(record, decoded);
    }
}
