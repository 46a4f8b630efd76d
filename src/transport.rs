// UDP transport (spec 6, "Socket interface (consumed)"). Bound to port
// 5353, multicast group 224.0.0.251 (v4) / FF02::FB (v6), matching the
// teacher's plain std::net::UdpSocket style (main.rs) with socket2 used
// only for the options std::net doesn't expose (multicast TTL, reuseport,
// join/leave on a specific interface).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{MdnsError, Result};

pub const MDNS_PORT: u16 = 5353;
pub const MDNS_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

pub struct ReceivedDatagram {
    pub bytes: Vec<u8>,
    pub src: SocketAddr,
}

// Narrow contract the core depends on; a loopback-only fake implements the
// same trait for tests (spec A.4 test tooling).
pub trait MdnsSocket: Send {
    fn send_to(&self, bytes: &[u8], dst: SocketAddr) -> Result<()>;
    // Blocks until a datagram is available or the read timeout elapses.
    fn recv(&self) -> Result<Option<ReceivedDatagram>>;
}

pub struct UdpTransport {
    v4: Option<UdpSocket>,
    v6: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn bind_ipv4(iface_addr: Ipv4Addr) -> Result<UdpTransport> {
        let socket = Socket::new(Domain::ipv4(), Type::dgram(), Some(Protocol::udp()))
            .map_err(|_| MdnsError::Param)?;
        socket.set_reuse_address(true).map_err(|_| MdnsError::Param)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(|_| MdnsError::Param)?;
        let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, MDNS_PORT).into();
        socket.bind(&bind_addr.into()).map_err(|_| MdnsError::Param)?;
        socket
            .join_multicast_v4(&MDNS_GROUP_V4, &iface_addr)
            .map_err(|_| MdnsError::Param)?;
        socket.set_multicast_loop_v4(true).map_err(|_| MdnsError::Param)?;
        let std_socket: UdpSocket = socket.into_udp_socket();
        std_socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .map_err(|_| MdnsError::Param)?;
        Ok(UdpTransport {
            v4: Some(std_socket),
            v6: None,
        })
    }

    pub fn bind_ipv6(iface_index: u32) -> Result<UdpTransport> {
        let socket = Socket::new(Domain::ipv6(), Type::dgram(), Some(Protocol::udp()))
            .map_err(|_| MdnsError::Param)?;
        socket.set_reuse_address(true).map_err(|_| MdnsError::Param)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(|_| MdnsError::Param)?;
        let bind_addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, MDNS_PORT).into();
        socket.bind(&bind_addr.into()).map_err(|_| MdnsError::Param)?;
        socket
            .join_multicast_v6(&MDNS_GROUP_V6, iface_index)
            .map_err(|_| MdnsError::Param)?;
        let std_socket: UdpSocket = socket.into_udp_socket();
        std_socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .map_err(|_| MdnsError::Param)?;
        Ok(UdpTransport {
            v4: None,
            v6: Some(std_socket),
        })
    }

    pub fn leave_ipv4(&self, iface_addr: Ipv4Addr) -> Result<()> {
        if let Some(sock) = &self.v4 {
            let socket = Socket::from(clone_socket(sock)?);
            socket
                .leave_multicast_v4(&MDNS_GROUP_V4, &iface_addr)
                .map_err(|_| MdnsError::Param)?;
        }
        Ok(())
    }
}

// std::net::UdpSocket implements try_clone; socket2 doesn't let us build a
// Socket from a &UdpSocket directly without taking ownership, so we clone
// the fd the same way the teacher's single-socket main.rs would if it ever
// needed two owners.
fn clone_socket(sock: &UdpSocket) -> Result<UdpSocket> {
    sock.try_clone().map_err(|_| MdnsError::Param)
}

impl MdnsSocket for UdpTransport {
    fn send_to(&self, bytes: &[u8], dst: SocketAddr) -> Result<()> {
        let sock = match dst.ip() {
            IpAddr::V4(_) => self.v4.as_ref(),
            IpAddr::V6(_) => self.v6.as_ref(),
        };
        let sock = sock.ok_or(MdnsError::Param)?;
        sock.send_to(bytes, dst).map_err(|_| MdnsError::Param)?;
        Ok(())
    }

    fn recv(&self) -> Result<Option<ReceivedDatagram>> {
        let mut buf = [0u8; 9000];
        if let Some(sock) = &self.v4 {
            match sock.recv_from(&mut buf) {
                Ok((amt, src)) => {
                    return Ok(Some(ReceivedDatagram {
                        bytes: buf[..amt].to_vec(),
                        src,
                    }))
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(_) => return Err(MdnsError::Param),
            }
        }
        if let Some(sock) = &self.v6 {
            match sock.recv_from(&mut buf) {
                Ok((amt, src)) => {
                    return Ok(Some(ReceivedDatagram {
                        bytes: buf[..amt].to_vec(),
                        src,
                    }))
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(_) => return Err(MdnsError::Param),
            }
        }
        Ok(None)
    }
}
