use super::{bigendians, names, DnsClass, DnsFormatError, DnsRRType};

// Grounded on dylnuge-montague's dns::protocol::question::DnsQuestion, with
// the "QU" unicast-response-desired bit (spec 4.6, "duplicate-question
// suppression") added as the top bit of qclass, the same way the
// cache-flush bit rides the RR class field.
#[derive(Clone, PartialEq, Debug)]
pub struct DnsQuestion {
    pub qname: Vec<String>,
    pub qtype: DnsRRType,
    pub qclass: DnsClass,
    // True ("QU") means the querier will accept a unicast reply; false
    // ("QM") is the ordinary multicast question that duplicate-question
    // suppression applies to.
    pub unicast_response: bool,
}

impl DnsQuestion {
    pub fn from_bytes(packet_bytes: &[u8], pos: usize) -> Result<(DnsQuestion, usize), DnsFormatError> {
        let (qname, new_pos) = names::deserialize_name(packet_bytes, pos)?;
        if new_pos + 4 > packet_bytes.len() {
            return Err(DnsFormatError::make_error("end of packet parsing question"));
        }
        let qtype_num = bigendians::to_u16(&packet_bytes[new_pos..new_pos + 2]);
        let qclass_num = bigendians::to_u16(&packet_bytes[new_pos + 2..new_pos + 4]);
        let pos = new_pos + 4;

        let qtype = num::FromPrimitive::from_u16(qtype_num)
            .ok_or_else(|| DnsFormatError::make_error(format!("invalid qtype: {:x}", qtype_num)))?;
        let (qclass, unicast_response) = DnsClass::from_wire(qclass_num)
            .ok_or_else(|| DnsFormatError::make_error(format!("invalid qclass: {:x}", qclass_num)))?;

        Ok((
            DnsQuestion {
                qname,
                qtype,
                qclass,
                unicast_response,
            },
            pos,
        ))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DnsFormatError> {
        let mut bytes = names::serialize_name(&self.qname)?;
        bytes.extend_from_slice(&bigendians::from_u16(self.qtype as u16));
        bytes.extend_from_slice(&bigendians::from_u16(self.qclass.to_wire(self.unicast_response)));
        Ok(bytes)
    }
}
