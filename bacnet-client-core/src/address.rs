//! BACnet datalink addresses and the tagged-field equality rule used to
//! correlate handler callbacks with the pending request they answer.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bacnet_rs::datalink::DataLinkAddress;

/// A BACnet address: network number plus a variable-length MAC and a
/// variable-length routed-address tail.
///
/// Mirrors the `BACNET_ADDRESS` struct of the reference stack: `mac` is the
/// datalink-local address (for BACnet/IP, 4 IP octets + 2 port bytes), `adr`
/// is populated only when the device sits behind a BACnet router. A length
/// of zero in either field means "don't compare the bytes" rather than
/// "empty" — see [`BacnetAddress::matches`].
#[derive(Debug, Clone, Default)]
pub struct BacnetAddress {
    pub net: u16,
    pub mac: Vec<u8>,
    pub adr: Vec<u8>,
}

impl BacnetAddress {
    /// The placeholder stored by `find_and_bind` before a device is bound:
    /// zero-length MAC, used by the I-Am handler to recognize "binding not
    /// yet performed" (see the I-Am handler in `handlers.rs`).
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        self.mac.is_empty()
    }

    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => {
                let mut mac = Vec::with_capacity(6);
                mac.extend_from_slice(&v4.ip().octets());
                mac.extend_from_slice(&v4.port().to_be_bytes());
                Self {
                    net: 0,
                    mac,
                    adr: Vec::new(),
                }
            }
            SocketAddr::V6(_) => Self::default(),
        }
    }

    /// Recover the IPv4 socket address this entry was bound from, if it was
    /// ever populated from one (used by `ip_to_instance`).
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        if self.mac.len() != 6 {
            return None;
        }
        let ip = Ipv4Addr::new(self.mac[0], self.mac[1], self.mac[2], self.mac[3]);
        let port = u16::from_be_bytes([self.mac[4], self.mac[5]]);
        Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
    }

    pub fn from_datalink_address(addr: &DataLinkAddress) -> Option<Self> {
        match addr {
            DataLinkAddress::Ip(socket) => Some(Self::from_socket_addr(*socket)),
            _ => None,
        }
    }

    pub fn to_datalink_address(&self) -> Option<DataLinkAddress> {
        self.to_socket_addr().map(DataLinkAddress::Ip)
    }

    /// Tagged-field equality: nets must match, and for each of `mac`/`adr`,
    /// either side having length zero suppresses the byte comparison for
    /// that field (matches the original `bacnet_address_matches` helper,
    /// which only ever compares when both lengths agree and are nonzero).
    pub fn matches(&self, other: &BacnetAddress) -> bool {
        if self.net != other.net {
            return false;
        }
        if !Self::field_matches(&self.mac, &other.mac) {
            return false;
        }
        Self::field_matches(&self.adr, &other.adr)
    }

    fn field_matches(a: &[u8], b: &[u8]) -> bool {
        if a.is_empty() || b.is_empty() {
            return true;
        }
        a == b
    }
}

impl PartialEq for BacnetAddress {
    fn eq(&self, other: &Self) -> bool {
        self.net == other.net && self.mac == other.mac && self.adr == other.adr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_has_zero_length_mac() {
        assert!(BacnetAddress::placeholder().is_placeholder());
    }

    #[test]
    fn matches_is_reflexive_symmetric_transitive() {
        let a = BacnetAddress::from_socket_addr("10.0.0.5:47808".parse().unwrap());
        let b = BacnetAddress::from_socket_addr("10.0.0.5:47808".parse().unwrap());
        let c = BacnetAddress::from_socket_addr("10.0.0.5:47808".parse().unwrap());

        assert!(a.matches(&a));
        assert_eq!(a.matches(&b), b.matches(&a));
        assert!(a.matches(&b) && b.matches(&c) && a.matches(&c));
    }

    #[test]
    fn matches_rejects_differing_net_len_or_bytes() {
        let a = BacnetAddress::from_socket_addr("10.0.0.5:47808".parse().unwrap());
        let mut different_net = a.clone();
        different_net.net = 7;
        assert!(!a.matches(&different_net));

        let different_bytes = BacnetAddress::from_socket_addr("10.0.0.6:47808".parse().unwrap());
        assert!(!a.matches(&different_bytes));
    }

    #[test]
    fn zero_length_field_suppresses_comparison() {
        let full = BacnetAddress::from_socket_addr("10.0.0.5:47808".parse().unwrap());
        let placeholder = BacnetAddress::placeholder();
        assert!(full.matches(&placeholder));
        assert!(placeholder.matches(&full));
    }

    #[test]
    fn round_trips_through_socket_addr() {
        let sock: SocketAddr = "192.0.2.10:47808".parse().unwrap();
        let addr = BacnetAddress::from_socket_addr(sock);
        assert_eq!(addr.to_socket_addr(), Some(sock));
    }
}
