//! ICMP message construction (RFC 792).

use log::debug;

use crate::checksum::checksum;
use crate::cursor::Writer;
use crate::ipv4;

pub use crate::ipv4::MAX_SEND_SIZE;

pub const HEADER_LEN: usize = 8;

/// Identifier carried by our echo requests and expected back in replies.
pub const PAIRING_ID: u16 = 0x4242;

/// Largest echo payload that still fits in [`MAX_SEND_SIZE`].
pub const MAX_PAYLOAD_LEN: usize = MAX_SEND_SIZE - ipv4::MIN_HEADER_LEN - HEADER_LEN;

const CHECKSUM_OFFSET: usize = 2;

pub const ECHO_REPLY: u8 = 0;
pub const DEST_UNREACH: u8 = 3;
pub const SOURCE_QUENCH: u8 = 4;
pub const REDIRECT: u8 = 5;
pub const ECHO_REQUEST: u8 = 8;
pub const ROUTER_ADVERT: u8 = 9;
pub const ROUTER_SOLICIT: u8 = 10;
pub const TIME_EXCEEDED: u8 = 11;
pub const PARAMETER_PROBLEM: u8 = 12;
pub const TIMESTAMP: u8 = 13;
pub const TIMESTAMP_REPLY: u8 = 14;
pub const INFO_REQUEST: u8 = 15;
pub const INFO_REPLY: u8 = 16;
pub const ADDRESS_MASK_REQUEST: u8 = 17;
pub const ADDRESS_MASK_REPLY: u8 = 18;

/// Assembles an ICMP message from its type, code, the 4 type-specific
/// header bytes and a body, then writes the checksum over all of it.
pub fn build_message(kind: u8, code: u8, rest: [u8; 4], body: &[u8]) -> Vec<u8> {
    let mut w = Writer::with_capacity(HEADER_LEN + body.len());
    w.put_u8(kind);
    w.put_u8(code);
    w.put_u16(0);
    w.put_slice(&rest);
    w.put_slice(body);

    let mut pkt = w.into_inner();
    let sum = checksum(&pkt);
    pkt[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
    pkt
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoKind {
    Request,
    Reply,
}

/// An echo request or reply ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoMessage {
    pub kind: EchoKind,
    pub ident: u16,
    pub seq: u16,
    pub payload: Vec<u8>,
}

impl EchoMessage {
    /// Payloads over [`MAX_PAYLOAD_LEN`] are cut down to it.
    pub fn new(kind: EchoKind, ident: u16, seq: u16, payload: &[u8]) -> Self {
        let keep = payload.len().min(MAX_PAYLOAD_LEN);
        if keep < payload.len() {
            debug!(
                "truncating echo payload from {} to {} bytes",
                payload.len(),
                keep
            );
        }
        EchoMessage {
            kind,
            ident,
            seq,
            payload: payload[..keep].to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let kind = match self.kind {
            EchoKind::Request => ECHO_REQUEST,
            EchoKind::Reply => ECHO_REPLY,
        };
        let mut rest = [0u8; 4];
        rest[..2].copy_from_slice(&self.ident.to_be_bytes());
        rest[2..].copy_from_slice(&self.seq.to_be_bytes());
        build_message(kind, 0, rest, &self.payload)
    }
}

/// Builds an Echo Request (type 8, code 0).
pub fn build_echo(ident: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    EchoMessage::new(EchoKind::Request, ident, seq, payload).encode()
}
