//! IPv4 header (RFC 791) decoding and the outbound wrapper.

use std::net::Ipv4Addr;

use log::debug;

use crate::checksum::checksum;
use crate::cursor::{Reader, Writer};
use crate::error::DecodeError;

pub const MIN_HEADER_LEN: usize = 20;

/// Largest datagram the sender transmits, IPv4 header included.
pub const MAX_SEND_SIZE: usize = 500;

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

/// TTL stamped on every outbound datagram.
pub const DEFAULT_TTL: u8 = 120;
/// Identification stamped on every outbound datagram.
pub const IDENTIFICATION: u16 = 0x4242;

const CHECKSUM_OFFSET: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    /// Header length in 32-bit words.
    pub ihl: u8,
    pub tos: u8,
    pub total_len: u16,
    pub identification: u16,
    /// Flags in the top 3 bits, fragment offset in the low 13.
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub options: Vec<u8>,
}

impl Ipv4Header {
    /// Decodes the header at the cursor, options included, leaving the
    /// cursor on the first payload byte.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let start = r.position();
        let vihl = r.read_u8()?;
        let version = vihl >> 4;
        let ihl = vihl & 0x0f;
        if version != 4 {
            return Err(DecodeError::BadVersion(version));
        }
        if (ihl as usize) * 4 < MIN_HEADER_LEN {
            return Err(DecodeError::BadHeaderLength(ihl));
        }

        let tos = r.read_u8()?;
        let total_len = r.read_u16()?;
        let identification = r.read_u16()?;
        let flags_fragment = r.read_u16()?;
        let ttl = r.read_u8()?;
        let protocol = r.read_u8()?;
        let checksum = r.read_u16()?;
        let source = r.read_ipv4()?;
        let destination = r.read_ipv4()?;
        let consumed = r.position() - start;
        let options = r.take(ihl as usize * 4 - consumed)?.to_vec();

        Ok(Ipv4Header {
            version,
            ihl,
            tos,
            total_len,
            identification,
            flags_fragment,
            ttl,
            protocol,
            checksum,
            source,
            destination,
            options,
        })
    }

    pub fn header_len(&self) -> usize {
        self.ihl as usize * 4
    }

    pub fn flags(&self) -> u8 {
        ((self.flags_fragment & 0xe000) >> 13) as u8
    }

    pub fn fragment_offset(&self) -> u16 {
        self.flags_fragment & 0x1fff
    }

    /// Writes the header as stored, checksum field included.
    pub fn encode(&self, w: &mut Writer) {
        w.put_u8((self.version << 4) | (self.ihl & 0x0f));
        w.put_u8(self.tos);
        w.put_u16(self.total_len);
        w.put_u16(self.identification);
        w.put_u16(self.flags_fragment);
        w.put_u8(self.ttl);
        w.put_u8(self.protocol);
        w.put_u16(self.checksum);
        w.put_ipv4(self.source);
        w.put_ipv4(self.destination);
        w.put_slice(&self.options);
    }
}

/// Wraps `inner` in a 20-byte IPv4 header carrying `protocol`.
///
/// `inner` is cut down so the datagram fits in [`MAX_SEND_SIZE`]; the
/// total length field always matches the returned buffer. The header
/// checksum covers the header only.
pub fn build_ipv4(protocol: u8, inner: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    let keep = inner.len().min(MAX_SEND_SIZE - MIN_HEADER_LEN);
    if keep < inner.len() {
        debug!("truncating IPv4 payload from {} to {} bytes", inner.len(), keep);
    }
    let inner = &inner[..keep];

    let header = Ipv4Header {
        version: 4,
        ihl: (MIN_HEADER_LEN / 4) as u8,
        tos: 0,
        total_len: (MIN_HEADER_LEN + inner.len()) as u16,
        identification: IDENTIFICATION,
        flags_fragment: 0,
        ttl: DEFAULT_TTL,
        protocol,
        checksum: 0,
        source: src,
        destination: dst,
        options: Vec::new(),
    };

    let mut w = Writer::with_capacity(MIN_HEADER_LEN + inner.len());
    header.encode(&mut w);
    w.put_slice(inner);

    let mut pkt = w.into_inner();
    let sum = checksum(&pkt[..MIN_HEADER_LEN]);
    pkt[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
    pkt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::verify;
    use smoltcp::wire::{IpProtocol, Ipv4Address, Ipv4Packet};

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    #[test]
    fn builds_fixed_header_fields() {
        let pkt = build_ipv4(PROTO_ICMP, &[1, 2, 3, 4, 5], SRC, DST);
        assert_eq!(pkt.len(), 25);
        assert_eq!(pkt[0], 0x45);
        assert_eq!(pkt[1], 0);
        assert_eq!(u16::from_be_bytes([pkt[2], pkt[3]]), 25);
        assert_eq!(u16::from_be_bytes([pkt[4], pkt[5]]), 0x4242);
        assert_eq!(&pkt[6..8], &[0, 0]);
        assert_eq!(pkt[8], 120);
        assert_eq!(pkt[9], PROTO_ICMP);
        assert!(verify(&pkt[..MIN_HEADER_LEN]));
        assert_eq!(&pkt[20..], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn oversized_inner_is_cut_to_send_bound() {
        let pkt = build_ipv4(PROTO_ICMP, &vec![0u8; 70_000], SRC, DST);
        assert_eq!(pkt.len(), MAX_SEND_SIZE);
        assert_eq!(u16::from_be_bytes([pkt[2], pkt[3]]) as usize, pkt.len());
        assert!(verify(&pkt[..MIN_HEADER_LEN]));

        let at_bound = build_ipv4(PROTO_ICMP, &[1u8; MAX_SEND_SIZE - MIN_HEADER_LEN], SRC, DST);
        assert_eq!(at_bound.len(), MAX_SEND_SIZE);
    }

    #[test]
    fn smoltcp_accepts_built_header() {
        let pkt = build_ipv4(PROTO_UDP, &[0u8; 12], SRC, DST);
        let parsed = Ipv4Packet::new_checked(&pkt[..]).unwrap();
        assert!(parsed.verify_checksum());
        assert_eq!(parsed.protocol(), IpProtocol::Udp);
        assert_eq!(parsed.hop_limit(), DEFAULT_TTL);
        assert_eq!(parsed.src_addr(), Ipv4Address::new(10, 0, 0, 1));
        assert_eq!(parsed.dst_addr(), Ipv4Address::new(10, 0, 0, 2));
        assert_eq!(parsed.payload().len(), 12);
    }

    #[test]
    fn decode_keeps_options_and_stops_at_payload() {
        let mut pkt = build_ipv4(PROTO_TCP, &[0xaa, 0xbb], SRC, DST);
        // Grow the header to 6 words with one option word.
        pkt[0] = 0x46;
        pkt.splice(20..20, [0x01, 0x01, 0x01, 0x00]);

        let mut r = Reader::new(&pkt);
        let hdr = Ipv4Header::decode(&mut r).unwrap();
        assert_eq!(hdr.header_len(), 24);
        assert_eq!(hdr.options, vec![0x01, 0x01, 0x01, 0x00]);
        assert_eq!(hdr.source, SRC);
        assert_eq!(hdr.destination, DST);
        assert_eq!(r.rest(), &[0xaa, 0xbb]);
    }

    #[test]
    fn decode_splits_flags_and_offset() {
        let mut pkt = build_ipv4(PROTO_ICMP, &[], SRC, DST);
        pkt[6] = 0x40 | 0x01;
        pkt[7] = 0x02;
        let hdr = Ipv4Header::decode(&mut Reader::new(&pkt)).unwrap();
        assert_eq!(hdr.flags(), 0b010);
        assert_eq!(hdr.fragment_offset(), 0x0102);
    }

    #[test]
    fn decode_rejects_bad_version_and_length() {
        let mut pkt = build_ipv4(PROTO_ICMP, &[], SRC, DST);
        pkt[0] = 0x65;
        assert_eq!(
            Ipv4Header::decode(&mut Reader::new(&pkt)),
            Err(DecodeError::BadVersion(6))
        );
        pkt[0] = 0x44;
        assert_eq!(
            Ipv4Header::decode(&mut Reader::new(&pkt)),
            Err(DecodeError::BadHeaderLength(4))
        );
        pkt[0] = 0x4f;
        assert!(matches!(
            Ipv4Header::decode(&mut Reader::new(&pkt)),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn encode_round_trips_decoded_header() {
        let pkt = build_ipv4(PROTO_ICMP, &[9; 8], SRC, DST);
        let hdr = Ipv4Header::decode(&mut Reader::new(&pkt)).unwrap();
        let mut w = Writer::default();
        hdr.encode(&mut w);
        assert_eq!(w.into_inner(), &pkt[..MIN_HEADER_LEN]);
    }
}
