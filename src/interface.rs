// Per-interface runtime state: which addresses it owns and which
// transports (spec 6, "Socket interface (consumed)") it sends/receives
// through. The core keeps one `Interface` per enabled interface index; a
// disabled interface is simply absent from the map.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::transport::MdnsSocket;

pub struct Interface {
    pub index: u32,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub(crate) transports: Vec<Box<dyn MdnsSocket>>,
}

impl Interface {
    pub fn new(
        index: u32,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
        transports: Vec<Box<dyn MdnsSocket>>,
    ) -> Interface {
        Interface {
            index,
            ipv4,
            ipv6,
            transports,
        }
    }
}
