// Error taxonomy for the mDNS core (spec section 7).
//
// API-facing variants propagate to callers of the application interface
// (`Mdns::*`); the packet-processing variants are never surfaced, they are
// logged at debug level and the offending datagram is dropped.

use thiserror::Error;

use crate::wire::DnsFormatError;

#[derive(Debug, Error)]
pub enum MdnsError {
    #[error("invalid argument")]
    Param,

    #[error("string exceeds size bounds")]
    DataSize,

    #[error("host name contains illegal characters")]
    HostName,

    #[error("cache arena exhausted, misaligned, or corrupt")]
    Cache,

    #[error("interface is not enabled")]
    NotEnabled,

    #[error("mdns core has not been started")]
    NotStarted,

    #[error("interface is already enabled")]
    AlreadyEnabled,

    #[error("an identical service is already registered")]
    ExistSameService,

    #[error("an identical continuous query is already registered")]
    ExistSameQuery,

    #[error("a unique record for this name already exists")]
    ExistUniqueRr,

    #[error("a shared record for this name already exists")]
    ExistSharedRr,

    #[error("record type is outside the recognised set")]
    UnsupportedType,

    #[error("no matching resource record")]
    NoRr,

    #[error("no more entries")]
    NoMoreEntries,

    #[error("malformed DNS wire data: {0}")]
    Wire(#[from] DnsFormatError),
}

pub type Result<T> = std::result::Result<T, MdnsError>;

// Packet-processing rejections: always silent (logged, datagram dropped),
// never returned across the application interface. Kept separate from
// `MdnsError` so a caller can never accidentally propagate one.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PacketRejection {
    #[error("name in question/answer did not match the record it was tested against")]
    NameMismatch,
    #[error("a label exceeded the 63 octet maximum")]
    ExceedMaxLabel,
    #[error("source port was not the mDNS port")]
    UdpPortError,
    #[error("destination address was not the mDNS multicast group")]
    DestAddressError,
    #[error("source address for an mDNS response was not on-link")]
    NotLocalLink,
    #[error("response packet did not have the AA bit set")]
    AuthError,
}
