use num_derive::FromPrimitive;

// Grounded on dylnuge-montague's dns::opcode::DnsOpcode. mDNS responders only
// ever originate opcode 0 (spec 6, "Standard DNS message framing"), but we
// keep the full enum so a malformed/foreign packet decodes rather than
// panics.
#[derive(FromPrimitive, Copy, Clone, PartialEq, Eq, Debug)]
pub enum DnsOpcode {
    Query = 0,
    IQuery = 1,
    Status = 2,
    Zone = 4,
    Update = 5,
    DSO = 6,
}
