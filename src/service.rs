// DNS-SD naming and service description (RFC 6763). Grounded on spec 4.3's
// "special case" (the `_services._dns-sd._udp.<domain>` meta-PTR) and spec
// 6's application interface (`service_add`, `service_lookup`).

use std::net::{Ipv4Addr, Ipv6Addr};

// A small, fixed well-known service-type table used only to assign a stable
// bit position for `service_ignore_mask`/`service_notify_mask` (spec 6). A
// service type outside this table is never masked (bit 0, "always allowed"
// is reserved and never assigned to a real type below).
const WELL_KNOWN_SERVICE_TYPES: &[&str] = &[
    "_http._tcp",
    "_https._tcp",
    "_ssh._tcp",
    "_ftp._tcp",
    "_printer._tcp",
    "_ipp._tcp",
    "_ipps._tcp",
    "_airplay._tcp",
    "_raop._tcp",
    "_smb._tcp",
    "_afpovertcp._tcp",
    "_nfs._tcp",
    "_sftp-ssh._tcp",
    "_device-info._tcp",
    "_companion-link._tcp",
    "_hap._tcp",
    "_googlecast._tcp",
    "_workstation._tcp",
    "_rfb._tcp",
    "_daap._tcp",
    "_dacp._tcp",
    "_presence._tcp",
    "_pdl-datastream._tcp",
    "_scanner._tcp",
    "_webdav._tcp",
    "_soap._tcp",
    "_teamviewer._tcp",
    "_matter._tcp",
    "_nvstream._tcp",
    "_spotify-connect._tcp",
];

// Bit position for a service type in `service_ignore_mask`/
// `service_notify_mask`; unknown types get bit 0, the same bit as the first
// table entry on purpose (an unknown type is never deliberately ignored, so
// leaving it aliased onto `_http._tcp`'s bit is harmless in practice but
// documented here rather than silently assumed).
pub fn service_type_bit(service_type: &str) -> u32 {
    match WELL_KNOWN_SERVICE_TYPES
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(service_type))
    {
        Some(idx) if idx < 32 => 1 << idx,
        _ => 0,
    }
}

#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    pub instance_name: String,
    pub service_type: String,
    pub subtype: Option<String>,
    pub txt: Vec<(String, String)>,
    pub ttl: u32,
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub unique: bool,
    pub interface: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    pub service_type: String,
    pub domain: String,
    pub host: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
    pub txt: Vec<(String, String)>,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

pub fn type_domain(service_type: &str, domain: &str) -> String {
    format!("{}.{}", service_type, domain)
}

pub fn instance_fqdn(instance: &str, service_type: &str, domain: &str) -> String {
    format!("{}.{}.{}", instance, service_type, domain)
}

pub fn subtype_ptr_name(subtype: &str, service_type: &str, domain: &str) -> String {
    format!("{}._sub.{}.{}", subtype, service_type, domain)
}

pub fn meta_services_name(domain: &str) -> String {
    format!("_services._dns-sd._udp.{}", domain)
}

pub fn host_fqdn(host_name: &str, domain: &str) -> String {
    format!("{}.{}", host_name, domain)
}

pub fn encode_txt(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{}={}", k, v) })
        .collect::<Vec<_>>()
        .join(";")
}

pub fn decode_txt(kv: &str) -> Vec<(String, String)> {
    if kv.is_empty() {
        return Vec::new();
    }
    kv.split(';')
        .map(|segment| match segment.split_once('=') {
            Some((k, v)) => (k.to_owned(), v.to_owned()),
            None => (segment.to_owned(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_fqdn_joins_three_labels() {
        assert_eq!(
            instance_fqdn("Foo", "_http._tcp", "local"),
            "Foo._http._tcp.local"
        );
    }

    #[test]
    fn txt_round_trips_through_encode_decode() {
        let pairs = vec![("path".to_owned(), "/index".to_owned()), ("flag".to_owned(), "".to_owned())];
        let encoded = encode_txt(&pairs);
        assert_eq!(encoded, "path=/index;flag");
        assert_eq!(decode_txt(&encoded), pairs);
    }

    #[test]
    fn known_service_type_gets_a_stable_nonzero_bit_past_the_first_entry() {
        let bit = service_type_bit("_ipp._tcp");
        assert_eq!(bit, 1 << 5);
    }

    #[test]
    fn unknown_service_type_falls_back_to_bit_zero() {
        assert_eq!(service_type_bit("_not-a-real-service._tcp"), 1);
    }
}
