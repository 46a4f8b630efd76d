use num_derive::FromPrimitive;

// Grounded on dylnuge-montague's dns::rcode::DnsRCode.
#[derive(FromPrimitive, Copy, Clone, PartialEq, Eq, Debug)]
pub enum DnsRCode {
    NoError = 0,
    FormError = 1,
    ServFail = 2,
    NXDomain = 3,
    NotImp = 4,
    Refused = 5,
    YXDomain = 6,
    YXRRSet = 7,
    NXRRSet = 8,
    NotAuth = 9,
    NotZone = 10,
    DSOTypeNI = 11,
}
