//! ARP.

use super::ProtocolDescriptor;

pub const NAME: &str = "arp";

/// Fixed 8-byte prefix before the variable-length addresses.
const FIXED_LEN: usize = 8;

/// Length is 8 + 2 * (hardware length + protocol length).
pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::dynamic(NAME, |buf, offset| {
        let header = buf.get(offset..)?;
        let hlen = *header.get(4)? as usize;
        let plen = *header.get(5)? as usize;
        Some(FIXED_LEN + 2 * (hlen + plen))
    })
    .with_display_name("ARP")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethernet_ipv4_arp_length() {
        let arp = [
            0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01, // htype, ptype, hlen, plen, op
        ];
        assert_eq!(descriptor().resolve_length(&arp, 0), Some(28));
        assert_eq!(descriptor().resolve_length(&arp[..4], 0), None);
    }
}
