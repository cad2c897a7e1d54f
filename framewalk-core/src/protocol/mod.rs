//! Protocol descriptors and the registry.
//!
//! This module provides:
//! - [`ProtocolId`], the dense id every header type is addressed by
//! - [`ProtocolDescriptor`] and [`Binding`], the static description of a
//!   header type and of what may follow it
//! - [`ProtocolRegistry`], the table the dissector resolves ids against
//! - Built-in descriptors for common protocols
//!
//! ## Built-in Protocols
//!
//! | Layer | Protocols |
//! |-------|-----------|
//! | Link | Ethernet, Linux SLL, VLAN (802.1Q/802.1ad) |
//! | Network | IPv4, IPv6, ARP, ICMP, ICMPv6 |
//! | Transport | TCP, UDP |
//! | Application | HTTP/1.x headers |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use framewalk_core::protocol::{default_registry, ethernet};
//! use framewalk_core::Dissector;
//!
//! let registry = Arc::new(default_registry());
//! let root = registry.id_of(ethernet::NAME).unwrap();
//! let dissector = Dissector::new(registry.clone());
//! let mut chain = dissector.new_chain();
//!
//! let frame: &[u8] = &[
//!     0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // dst mac
//!     0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // src mac
//!     0x88, 0xcc,                         // ethertype (LLDP, not registered)
//!     0x02, 0x07, 0x04,
//! ];
//! dissector.dissect(frame, root, &mut chain);
//! for record in &chain {
//!     println!("{} at {}+{}", registry.name_of(record.id), record.offset, record.length);
//! }
//! ```

mod binding;
mod descriptor;
mod registry;

pub mod arp;
pub mod ethernet;
pub mod http;
pub mod icmp;
pub mod ipv4;
pub mod ipv6;
pub mod linux_sll;
pub mod tcp;
pub mod udp;
pub mod vlan;

// Test utilities (only compiled for tests)
#[cfg(test)]
pub mod test_utils;

pub use binding::{Binding, Predicate};
pub use descriptor::{HeaderLength, LengthFn, Overrides, ProtocolDescriptor, SubHeaderDecoder};
pub use registry::{ProtocolRegistry, PAYLOAD_NAME};

use std::fmt;

use tracing::warn;

/// Dense protocol id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolId(u16);

impl ProtocolId {
    /// Sentinel for opaque trailing payload.
    pub const PAYLOAD: ProtocolId = ProtocolId(0);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn as_index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_payload(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// IP protocol numbers.
pub mod ip_protocol {
    pub const ICMP: u8 = 1;
    pub const IPIP: u8 = 4;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const IPV6: u8 = 41;
    pub const ICMPV6: u8 = 58;
}

/// Create a registry with all built-in protocols and their bindings.
///
/// Descriptors are registered first so that every binding target has an id;
/// bindings are then attached in a fixed order, which is the order the
/// dissector tries them in.
pub fn default_registry() -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();

    // Layer 2
    add(&mut registry, ethernet::descriptor());
    add(&mut registry, linux_sll::descriptor());
    add(&mut registry, vlan::descriptor());
    add(&mut registry, arp::descriptor());

    // Layer 3
    add(&mut registry, ipv4::descriptor());
    add(&mut registry, ipv6::descriptor());
    add(&mut registry, icmp::descriptor());
    add(&mut registry, icmp::v6_descriptor());

    // Layer 4
    add(&mut registry, tcp::descriptor());
    add(&mut registry, udp::descriptor());

    // Application layer
    add(&mut registry, http::descriptor());

    ethernet::bind(&mut registry);
    linux_sll::bind(&mut registry);
    vlan::bind(&mut registry);
    ipv4::bind(&mut registry);
    ipv6::bind(&mut registry);
    tcp::bind(&mut registry);

    registry
}

fn add(registry: &mut ProtocolRegistry, descriptor: ProtocolDescriptor) {
    let name = descriptor.name();
    if let Err(err) = registry.register(descriptor) {
        warn!(name, %err, "skipping built-in protocol");
    }
}

/// Bind `from -> to` when both names are registered.
fn link<F>(registry: &mut ProtocolRegistry, from: &str, to: &str, make: F)
where
    F: FnOnce(ProtocolId) -> Binding,
{
    let (Some(from_id), Some(to_id)) = (registry.id_of(from), registry.id_of(to)) else {
        warn!(from, to, "built-in binding names an unregistered protocol");
        return;
    };
    if let Err(err) = registry.bind(from_id, make(to_id)) {
        warn!(from, to, %err, "skipping built-in binding");
    }
}
