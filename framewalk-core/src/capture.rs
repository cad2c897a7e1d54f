//! Captured packets and link-type root selection.
//!
//! The core never reads captures itself. A capture source hands over one
//! [`CapturedPacket`] per frame; the [`LinkTypeMap`] turns its link type
//! into the protocol id dissection starts from.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::DissectError;
use crate::protocol::{ethernet, ipv4, ipv6, linux_sll, ProtocolId, ProtocolRegistry};

/// Link-layer header types (LINKTYPE_* values).
pub mod link_type {
    pub const ETHERNET: u16 = 1;
    pub const RAW_IP: u16 = 101;
    pub const LINUX_SLL: u16 = 113;
    pub const RAW_IPV4: u16 = 228;
    pub const RAW_IPV6: u16 = 229;
}

/// One frame as delivered by a capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    /// 1-based position in the capture.
    pub frame_number: u64,
    pub timestamp_us: i64,
    pub captured_length: u32,
    pub original_length: u32,
    pub link_type: u16,
    pub data: Bytes,
}

impl CapturedPacket {
    /// Packet captured in full.
    pub fn new(frame_number: u64, timestamp_us: i64, link_type: u16, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u32;
        Self {
            frame_number,
            timestamp_us,
            captured_length: len,
            original_length: len,
            link_type,
            data,
        }
    }

    pub fn with_original_length(mut self, original_length: u32) -> Self {
        self.original_length = original_length;
        self
    }

    /// Whether the snap length cut the frame short.
    pub fn is_truncated(&self) -> bool {
        self.captured_length < self.original_length
    }
}

/// How a link type picks its root protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSelector {
    Fixed(ProtocolId),
    /// Raw IP: choose by the version nibble of the first byte.
    IpVersion { v4: ProtocolId, v6: ProtocolId },
}

/// Capture link type to root protocol.
#[derive(Debug, Clone, Default)]
pub struct LinkTypeMap {
    roots: HashMap<u16, RootSelector>,
}

impl LinkTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the standard link types onto the built-in descriptors present in
    /// `registry`.
    pub fn for_registry(registry: &ProtocolRegistry) -> Self {
        let mut map = Self::new();
        if let Some(id) = registry.id_of(ethernet::NAME) {
            map.insert(link_type::ETHERNET, RootSelector::Fixed(id));
        }
        if let Some(id) = registry.id_of(linux_sll::NAME) {
            map.insert(link_type::LINUX_SLL, RootSelector::Fixed(id));
        }
        let v4 = registry.id_of(ipv4::NAME);
        let v6 = registry.id_of(ipv6::NAME);
        if let Some(v4) = v4 {
            map.insert(link_type::RAW_IPV4, RootSelector::Fixed(v4));
        }
        if let Some(v6) = v6 {
            map.insert(link_type::RAW_IPV6, RootSelector::Fixed(v6));
        }
        if let (Some(v4), Some(v6)) = (v4, v6) {
            map.insert(link_type::RAW_IP, RootSelector::IpVersion { v4, v6 });
        }
        map
    }

    pub fn insert(&mut self, link_type: u16, selector: RootSelector) {
        self.roots.insert(link_type, selector);
    }

    pub fn get(&self, link_type: u16) -> Option<RootSelector> {
        self.roots.get(&link_type).copied()
    }

    /// Root protocol for a frame of `link_type` starting with `data`.
    pub fn root_for(&self, link_type: u16, data: &[u8]) -> Result<ProtocolId, DissectError> {
        match self.roots.get(&link_type) {
            Some(RootSelector::Fixed(id)) => Ok(*id),
            Some(RootSelector::IpVersion { v4, v6 }) => match data.first().map(|b| b >> 4) {
                Some(6) => Ok(*v6),
                _ => Ok(*v4),
            },
            None => Err(DissectError::UnsupportedLinkType(link_type)),
        }
    }
}
