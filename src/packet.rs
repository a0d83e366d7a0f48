use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{NetworkEndian, ReadBytesExt};
use itertools::Itertools;

pub const ETH_TYPE_LLDP: u16 = 0x88cc;
pub const ETH_HEADER_LEN: usize = 14;

/// 48-bit Ethernet hardware address
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0.iter().format_with(":", |b, f| f(&format_args!("{:02x}", b)))
        )
    }
}

/// Topmost link-layer header of a packet
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EthernetHeader {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub ether_type: u16,
}

impl EthernetHeader {
    /// Parse the Ethernet header at the start of `data`,
    /// returns None if the frame is too short to hold one
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ETH_HEADER_LEN {
            return None;
        }
        let mut cursor = Cursor::new(data);
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        cursor.read_exact(&mut dst).ok()?;
        cursor.read_exact(&mut src).ok()?;
        let ether_type = cursor.read_u16::<NetworkEndian>().ok()?;
        Some(Self {
            dst: MacAddress(dst),
            src: MacAddress(src),
            ether_type,
        })
    }

    pub fn is_lldp(&self) -> bool {
        self.ether_type == ETH_TYPE_LLDP
    }
}

#[cfg(test)]
pub(crate) fn build_frame(dst: MacAddress, src: MacAddress, ether_type: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(60);
    frame.extend_from_slice(&dst.octets());
    frame.extend_from_slice(&src.octets());
    frame.extend_from_slice(&ether_type.to_be_bytes());
    frame.resize(60, 0);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_display() {
        let mac = MacAddress::new([0x00, 0x11, 0x22, 0xaa, 0xbb, 0x0c]);
        assert_eq!(mac.to_string(), "00:11:22:aa:bb:0c");
        assert_eq!(MacAddress::BROADCAST.to_string(), "ff:ff:ff:ff:ff:ff");
    }

    #[test]
    fn test_parse_header() {
        let dst = MacAddress::new([0, 0, 0, 0, 0, 2]);
        let src = MacAddress::new([0, 0, 0, 0, 0, 1]);
        let frame = build_frame(dst, src, 0x0800);
        let header = EthernetHeader::parse(&frame).unwrap();
        assert_eq!(header.dst, dst);
        assert_eq!(header.src, src);
        assert_eq!(header.ether_type, 0x0800);
        assert!(!header.is_lldp());

        let lldp = build_frame(dst, src, ETH_TYPE_LLDP);
        assert!(EthernetHeader::parse(&lldp).unwrap().is_lldp());
    }

    #[test]
    fn test_parse_short_frame() {
        assert!(EthernetHeader::parse(&[]).is_none());
        assert!(EthernetHeader::parse(&[0u8; 13]).is_none());
        assert!(EthernetHeader::parse(&[0u8; 14]).is_some());
    }
}
