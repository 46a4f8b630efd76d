use super::{bigendians, names, DnsClass, DnsFormatError, DnsRRType, DnsRecordData};

// Grounded on dylnuge-montague's dns::protocol::rr::DnsResourceRecord, with
// the cache-flush bit (spec 6) split out of the class field the way
// DnsQuestion splits out the QU bit.
#[derive(Clone, PartialEq, Debug)]
pub struct DnsResourceRecord {
    pub name: Vec<String>,
    pub class: DnsClass,
    pub cache_flush: bool,
    pub ttl: u32,
    pub rdata: DnsRecordData,
}

impl DnsResourceRecord {
    pub fn rr_type(&self) -> DnsRRType {
        self.rdata.rr_type()
    }

    pub fn from_bytes(packet_bytes: &[u8], pos: usize) -> Result<(DnsResourceRecord, usize), DnsFormatError> {
        let (name, new_pos) = names::deserialize_name(packet_bytes, pos)?;
        if new_pos + 10 > packet_bytes.len() {
            return Err(DnsFormatError::make_error("end of packet parsing resource record"));
        }
        let rrtype_num = bigendians::to_u16(&packet_bytes[new_pos..new_pos + 2]);
        let class_num = bigendians::to_u16(&packet_bytes[new_pos + 2..new_pos + 4]);
        let ttl = bigendians::to_u32(&packet_bytes[new_pos + 4..new_pos + 8]);
        let rd_length = bigendians::to_u16(&packet_bytes[new_pos + 8..new_pos + 10]);
        let data_start = new_pos + 10;

        let rr_type: DnsRRType = num::FromPrimitive::from_u16(rrtype_num)
            .ok_or_else(|| DnsFormatError::make_error(format!("invalid rrtype value: {:x}", rrtype_num)))?;
        let (class, cache_flush) = DnsClass::from_wire(class_num)
            .ok_or_else(|| DnsFormatError::make_error(format!("invalid class value: {:x}", class_num)))?;

        let rdata = DnsRecordData::from_bytes(packet_bytes, data_start, rr_type, rd_length)?;
        let pos = data_start + rd_length as usize;

        Ok((
            DnsResourceRecord {
                name,
                class,
                cache_flush,
                ttl,
                rdata,
            },
            pos,
        ))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DnsFormatError> {
        let mut bytes = names::serialize_name(&self.name)?;
        bytes.extend_from_slice(&bigendians::from_u16(self.rr_type() as u16));
        bytes.extend_from_slice(&bigendians::from_u16(self.class.to_wire(self.cache_flush)));
        bytes.extend_from_slice(&bigendians::from_u32(self.ttl));
        let rdata_bytes = self.rdata.to_bytes()?;
        bytes.extend_from_slice(&bigendians::from_u16(rdata_bytes.len() as u16));
        bytes.extend_from_slice(&rdata_bytes);
        Ok(bytes)
    }

    // Spec 4.1, "RR size on-wire": name_size + 10 (type, class, ttl,
    // rdlength) + rdata_length.
    pub fn size_on_wire(&self) -> Result<usize, DnsFormatError> {
        let name_size = names::serialize_name(&self.name)?.len();
        let rdata_size = self.rdata.to_bytes()?.len();
        Ok(name_size + 10 + rdata_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn a_record_serialize_parse_serialize_is_byte_identical() {
        let rr = DnsResourceRecord {
            name: vec!["host".to_owned(), "local".to_owned()],
            class: DnsClass::IN,
            cache_flush: true,
            ttl: 120,
            rdata: DnsRecordData::A(Ipv4Addr::new(1, 2, 3, 4)),
        };
        let first = rr.to_bytes().unwrap();
        let (parsed, consumed) = DnsResourceRecord::from_bytes(&first, 0).unwrap();
        assert_eq!(consumed, first.len());
        let second = parsed.to_bytes().unwrap();
        assert_eq!(first, second);
    }
}
