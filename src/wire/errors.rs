use std::fmt;

use super::{DnsFlags, DnsPacket, DnsRCode};

// Grounded on dylnuge-montague's `dns::errors::DnsFormatError`: a decode
// failure carries the partial packet decoded so far so the processor can
// build a FormErr reply without re-parsing. Kept as the teacher's own
// hand-rolled `std::error::Error` impl rather than `thiserror`'s derive
// (spec A.2): a derived `#[error(...)]` can't express "Display text plus a
// carried partial packet" as cleanly as a manual impl does here.
#[derive(Debug)]
pub struct DnsFormatError {
    message: String,
    partial: Option<Box<DnsPacket>>,
}

impl DnsFormatError {
    pub fn make_error(message: impl Into<String>) -> DnsFormatError {
        DnsFormatError {
            message: message.into(),
            partial: None,
        }
    }

    pub fn get_message(&self) -> &str {
        &self.message
    }

    pub fn set_partial(&mut self, packet: DnsPacket) {
        self.partial = Some(Box::new(packet));
    }

    // A FormErr response built from whatever of the packet we did manage to
    // decode. Per spec 7, packets too short to have even an id/opcode never
    // get a response at all.
    pub fn get_error_response(&self) -> Option<DnsPacket> {
        let packet = self.partial.as_ref()?;
        let flags = DnsFlags {
            qr_bit: true,
            opcode: packet.flags.opcode,
            aa_bit: false,
            tc_bit: false,
            rd_bit: packet.flags.rd_bit,
            ra_bit: false,
            ad_bit: false,
            cd_bit: false,
            rcode: DnsRCode::FormError,
        };
        Some(DnsPacket {
            id: packet.id,
            flags,
            questions: Vec::new(),
            answers: Vec::new(),
            nameservers: Vec::new(),
            addl_recs: Vec::new(),
        })
    }
}

impl fmt::Display for DnsFormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DNS packet had format error: {}", self.message)
    }
}

impl std::error::Error for DnsFormatError {}

