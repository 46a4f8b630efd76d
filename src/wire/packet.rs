use super::{bigendians, DnsFlags, DnsFormatError, DnsQuestion, DnsResourceRecord};

// Grounded on dylnuge-montague's dns::packet::DnsPacket (the more complete
// of the teacher's two header/section implementations).
#[derive(Clone, PartialEq, Debug)]
pub struct DnsPacket {
    pub id: u16,
    pub flags: DnsFlags,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsResourceRecord>,
    pub nameservers: Vec<DnsResourceRecord>,
    pub addl_recs: Vec<DnsResourceRecord>,
}

impl DnsPacket {
    pub fn from_bytes(bytes: &[u8]) -> Result<DnsPacket, DnsFormatError> {
        if bytes.len() < 12 {
            return Err(DnsFormatError::make_error("packet shorter than DNS header"));
        }
        let id = bigendians::to_u16(&bytes[0..2]);
        let flags = DnsFlags::from_bytes(&bytes[2..4])?;
        let qd_count = bigendians::to_u16(&bytes[4..6]);
        let an_count = bigendians::to_u16(&bytes[6..8]);
        let ns_count = bigendians::to_u16(&bytes[8..10]);
        let ar_count = bigendians::to_u16(&bytes[10..12]);

        let mut questions = Vec::with_capacity(qd_count as usize);
        let mut answers = Vec::with_capacity(an_count as usize);
        let mut nameservers = Vec::with_capacity(ns_count as usize);
        let mut addl_recs = Vec::with_capacity(ar_count as usize);

        let mut pos: usize = 12;
        let with_partial = |mut err: DnsFormatError, partial_id, partial_flags: &DnsFlags| {
            err.set_partial(DnsPacket {
                id: partial_id,
                flags: *partial_flags,
                questions: Vec::new(),
                answers: Vec::new(),
                nameservers: Vec::new(),
                addl_recs: Vec::new(),
            });
            err
        };

        for _ in 0..qd_count {
            let (question, new_pos) =
                DnsQuestion::from_bytes(bytes, pos).map_err(|e| with_partial(e, id, &flags))?;
            pos = new_pos;
            questions.push(question);
        }
        for _ in 0..an_count {
            let (rr, new_pos) =
                DnsResourceRecord::from_bytes(bytes, pos).map_err(|e| with_partial(e, id, &flags))?;
            pos = new_pos;
            answers.push(rr);
        }
        for _ in 0..ns_count {
            let (rr, new_pos) =
                DnsResourceRecord::from_bytes(bytes, pos).map_err(|e| with_partial(e, id, &flags))?;
            pos = new_pos;
            nameservers.push(rr);
        }
        for _ in 0..ar_count {
            let (rr, new_pos) =
                DnsResourceRecord::from_bytes(bytes, pos).map_err(|e| with_partial(e, id, &flags))?;
            pos = new_pos;
            addl_recs.push(rr);
        }

        Ok(DnsPacket {
            id,
            flags,
            questions,
            answers,
            nameservers,
            addl_recs,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DnsFormatError> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&bigendians::from_u16(self.id));
        bytes.extend_from_slice(&self.flags.to_bytes());
        bytes.extend_from_slice(&bigendians::from_u16(self.questions.len() as u16));
        bytes.extend_from_slice(&bigendians::from_u16(self.answers.len() as u16));
        bytes.extend_from_slice(&bigendians::from_u16(self.nameservers.len() as u16));
        bytes.extend_from_slice(&bigendians::from_u16(self.addl_recs.len() as u16));

        for question in &self.questions {
            bytes.extend_from_slice(&question.to_bytes()?);
        }
        for answer in &self.answers {
            bytes.extend_from_slice(&answer.to_bytes()?);
        }
        for nameserver in &self.nameservers {
            bytes.extend_from_slice(&nameserver.to_bytes()?);
        }
        for addl_rec in &self.addl_recs {
            bytes.extend_from_slice(&addl_rec.to_bytes()?);
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{DnsClass, DnsOpcode, DnsRCode, DnsRRType, DnsRecordData};
    use std::net::Ipv4Addr;

    #[test]
    fn empty_packet_round_trips() {
        let packet = DnsPacket {
            id: 42,
            flags: DnsFlags {
                qr_bit: true,
                opcode: DnsOpcode::Query,
                aa_bit: true,
                tc_bit: false,
                rd_bit: false,
                ra_bit: false,
                ad_bit: false,
                cd_bit: false,
                rcode: DnsRCode::NoError,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            nameservers: Vec::new(),
            addl_recs: Vec::new(),
        };
        let bytes = packet.to_bytes().unwrap();
        let decoded = DnsPacket::from_bytes(&bytes).unwrap();
        assert_eq!(packet, decoded);
    }

    #[test]
    fn packet_with_answer_round_trips() {
        let mut packet = DnsPacket {
            id: 1,
            flags: DnsFlags::response(false),
            questions: Vec::new(),
            answers: Vec::new(),
            nameservers: Vec::new(),
            addl_recs: Vec::new(),
        };
        packet.answers.push(DnsResourceRecord {
            name: vec!["printer".to_owned(), "local".to_owned()],
            class: DnsClass::IN,
            cache_flush: true,
            ttl: 120,
            rdata: DnsRecordData::A(Ipv4Addr::new(192, 0, 2, 5)),
        });
        let bytes = packet.to_bytes().unwrap();
        let decoded = DnsPacket::from_bytes(&bytes).unwrap();
        assert_eq!(packet, decoded);
        assert_eq!(decoded.answers[0].rr_type(), DnsRRType::A);
    }

    #[test]
    fn truncated_packet_carries_partial_for_formerr() {
        // Header claims one question but the packet ends right after it.
        let mut bytes = vec![0u8; 12];
        bytes[4..6].copy_from_slice(&bigendians::from_u16(1));
        let err = DnsPacket::from_bytes(&bytes).unwrap_err();
        let response = err.get_error_response();
        assert!(response.is_some());
        assert_eq!(response.unwrap().flags.rcode, DnsRCode::FormError);
    }
}
