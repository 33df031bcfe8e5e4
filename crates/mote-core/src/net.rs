//! Node addressing
//!
//! The network stack is brought up outside of the core. Once it knows the
//! node's addresses it stores them in a [`NodeAddresses`], which the relay
//! consults through [`AddressSource`] when answering info requests.

use core::cell::RefCell;
use core::net::IpAddr;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Maximum number of addresses tracked for the primary interface
pub const MAX_ADDRESSES: usize = 4;

pub trait AddressSource {
    /// First routable address of the primary interface, if one is known
    fn primary_global(&self) -> Option<IpAddr>;
}

/// Whether `addr` may be reported as the node's address
pub fn is_global_candidate(addr: &IpAddr) -> bool {
    if addr.is_unspecified() || addr.is_loopback() || addr.is_multicast() {
        return false;
    }
    match addr {
        IpAddr::V4(v4) => !v4.is_link_local() && !v4.is_broadcast(),
        // fe80::/10
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
    }
}

/// Addresses of the primary interface, updated by the network bring-up code
pub struct NodeAddresses {
    addresses: Mutex<CriticalSectionRawMutex, RefCell<heapless::Vec<IpAddr, MAX_ADDRESSES>>>,
}

impl NodeAddresses {
    pub const fn new() -> Self {
        Self {
            addresses: Mutex::new(RefCell::new(heapless::Vec::new())),
        }
    }

    /// Replace the known addresses. Entries beyond [`MAX_ADDRESSES`] are dropped.
    pub fn set(&self, addresses: &[IpAddr]) {
        self.addresses.lock(|current| {
            let mut current = current.borrow_mut();
            current.clear();
            for addr in addresses.iter().take(MAX_ADDRESSES) {
                // Capacity is guaranteed by take()
                let _ = current.push(*addr);
            }
        });
    }

    pub fn clear(&self) {
        self.addresses.lock(|current| current.borrow_mut().clear());
    }

    pub fn len(&self) -> usize {
        self.addresses.lock(|current| current.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NodeAddresses {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSource for NodeAddresses {
    fn primary_global(&self) -> Option<IpAddr> {
        self.addresses.lock(|current| {
            current
                .borrow()
                .iter()
                .find(|addr| is_global_candidate(addr))
                .copied()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_skips_non_routable_addresses() {
        let addresses = NodeAddresses::new();
        assert_eq!(addresses.primary_global(), None);

        let global = IpAddr::V6(Ipv6Addr::new(0xfd17, 0xcafe, 0xcafe, 3, 0, 0, 0, 0x42));
        addresses.set(&[
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
            IpAddr::V6(Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1)),
            global,
        ]);
        assert_eq!(addresses.primary_global(), Some(global));
    }

    #[test]
    fn test_ipv4_candidates() {
        assert!(is_global_candidate(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
        assert!(!is_global_candidate(&IpAddr::V4(Ipv4Addr::new(169, 254, 3, 4))));
        assert!(!is_global_candidate(&IpAddr::V4(Ipv4Addr::UNSPECIFIED)));
        assert!(!is_global_candidate(&IpAddr::V4(Ipv4Addr::BROADCAST)));
    }

    #[test]
    fn test_set_truncates_and_clear_empties() {
        let addresses = NodeAddresses::new();
        let many = [IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)); 6];
        addresses.set(&many);
        assert_eq!(addresses.len(), MAX_ADDRESSES);

        addresses.clear();
        assert!(addresses.is_empty());
        assert_eq!(addresses.primary_global(), None);
    }
}
