use super::{DnsFormatError, DnsOpcode, DnsRCode};

// Grounded on dylnuge-montague's dns::protocol::flags::DnsFlags.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct DnsFlags {
    pub qr_bit: bool,
    pub opcode: DnsOpcode,
    pub aa_bit: bool,
    pub tc_bit: bool,
    pub rd_bit: bool,
    pub ra_bit: bool,
    pub ad_bit: bool,
    pub cd_bit: bool,
    pub rcode: DnsRCode,
}

impl DnsFlags {
    pub fn from_bytes(bytes: &[u8]) -> Result<DnsFlags, DnsFormatError> {
        let qr_bit = (bytes[0] >> 7) & 1 == 1;
        let aa_bit = (bytes[0] >> 2) & 1 == 1;
        let tc_bit = (bytes[0] >> 1) & 1 == 1;
        let rd_bit = (bytes[0]) & 1 == 1;
        let ra_bit = (bytes[1] >> 7) & 1 == 1;
        let ad_bit = (bytes[1] >> 5) & 1 == 1;
        let cd_bit = (bytes[1] >> 4) & 1 == 1;

        let opcode_val = (bytes[0] >> 3) & 0b1111;
        let rcode_val = bytes[1] & 0b1111;

        let opcode = num::FromPrimitive::from_u8(opcode_val)
            .ok_or_else(|| DnsFormatError::make_error(format!("Invalid opcode value: {:x}", opcode_val)))?;
        let rcode = num::FromPrimitive::from_u8(rcode_val)
            .ok_or_else(|| DnsFormatError::make_error(format!("Invalid rcode value: {:x}", rcode_val)))?;

        Ok(DnsFlags {
            qr_bit,
            opcode,
            aa_bit,
            tc_bit,
            rd_bit,
            ra_bit,
            ad_bit,
            cd_bit,
            rcode,
        })
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        let mut flag_bytes = [0x00, 0x00];
        if self.qr_bit {
            flag_bytes[0] |= 0b1000_0000;
        }
        if self.aa_bit {
            flag_bytes[0] |= 0b0000_0100;
        }
        if self.tc_bit {
            flag_bytes[0] |= 0b0000_0010;
        }
        if self.rd_bit {
            flag_bytes[0] |= 0b0000_0001;
        }
        if self.ra_bit {
            flag_bytes[1] |= 0b1000_0000;
        }
        if self.ad_bit {
            flag_bytes[1] |= 0b0010_0000;
        }
        if self.cd_bit {
            flag_bytes[1] |= 0b0001_0000;
        }

        let opcode_num = (self.opcode as u8) & 0x0f;
        let rcode_num = (self.rcode as u8) & 0x0f;
        flag_bytes[0] |= opcode_num << 3;
        flag_bytes[1] |= rcode_num;

        flag_bytes
    }

    // A standard, authoritative mDNS query (spec 6: AA always set on
    // responses, QR/AA clear on queries).
    pub fn query() -> DnsFlags {
        DnsFlags {
            qr_bit: false,
            opcode: DnsOpcode::Query,
            aa_bit: false,
            tc_bit: false,
            rd_bit: false,
            ra_bit: false,
            ad_bit: false,
            cd_bit: false,
            rcode: DnsRCode::NoError,
        }
    }

    pub fn response(truncated: bool) -> DnsFlags {
        DnsFlags {
            qr_bit: true,
            opcode: DnsOpcode::Query,
            aa_bit: true,
            tc_bit: truncated,
            rd_bit: false,
            ra_bit: false,
            ad_bit: false,
            cd_bit: false,
            rcode: DnsRCode::NoError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip() {
        let flags = DnsFlags::response(true);
        let bytes = flags.to_bytes();
        let decoded = DnsFlags::from_bytes(&bytes).expect("decode should succeed");
        assert_eq!(flags, decoded);
    }

    #[test]
    fn flags_deserialize_matches_teacher_vectors() {
        let flag_bytes = [0x01u8, 0x20u8];
        let expected = DnsFlags {
            qr_bit: false,
            opcode: DnsOpcode::Query,
            aa_bit: false,
            tc_bit: false,
            rd_bit: true,
            ra_bit: false,
            ad_bit: true,
            cd_bit: false,
            rcode: DnsRCode::NoError,
        };
        assert_eq!(expected, DnsFlags::from_bytes(&flag_bytes).unwrap());
    }
}
