// DNS wire codec (spec 4.1). Grounded on dylnuge-montague's dns/protocol
// split: one submodule per on-wire concept, re-exported flat here the way
// the teacher's protocol::mod does.

pub mod bigendians;
pub mod class;
pub mod errors;
pub mod flags;
pub mod names;
pub mod opcode;
pub mod packet;
pub mod question;
pub mod rcode;
pub mod rdata;
pub mod rr;
pub mod rrtype;
pub mod txt;

pub use class::DnsClass;
pub use errors::DnsFormatError;
pub use flags::DnsFlags;
pub use opcode::DnsOpcode;
pub use packet::DnsPacket;
pub use question::DnsQuestion;
pub use rcode::DnsRCode;
pub use rdata::DnsRecordData;
pub use rr::DnsResourceRecord;
pub use rrtype::DnsRRType;
