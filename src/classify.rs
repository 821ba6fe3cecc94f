//! Validation and classification of inbound IPv4/ICMP datagrams.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |     Code      |          Checksum             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Rest of Header                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Body (echo data, or offending IP header + 8 bytes)     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::fmt::Write;
use std::net::Ipv4Addr;

use crate::checksum::verify;
use crate::cursor::Reader;
use crate::error::{DecodeError, ParseError};
use crate::icmp::{self, PAIRING_ID};
use crate::ipv4::{self, Ipv4Header};

/// A datagram that passed every precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub ip: Ipv4Header,
    pub message: Message,
    /// Problems that did not stop classification.
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Declared total length differs from what was received; the smaller
    /// of the two was used.
    LengthMismatch { declared: u16, received: usize },
    IpChecksum,
    IcmpChecksum,
    /// The datagram embedded in an error message could not be decoded.
    EmbeddedUnreadable(DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    EchoReply(Echo),
    /// An echo reply whose identifier is not ours.
    ForeignReply { ident: u16, seq: u16 },
    EchoRequest(Echo),
    DestinationUnreachable {
        code: UnreachableCode,
        next_hop_mtu: Option<u16>,
        embedded: Option<Embedded>,
    },
    SourceQuench {
        embedded: Option<Embedded>,
    },
    Redirect {
        code: RedirectCode,
        gateway: Ipv4Addr,
        embedded: Option<Embedded>,
    },
    RouterAdvertisement { count: u8, lifetime: u16 },
    RouterSolicitation,
    TimeExceeded {
        code: TimeExceededCode,
        embedded: Option<Embedded>,
    },
    ParameterProblem {
        code: ParameterProblemCode,
        pointer: u8,
        embedded: Option<Embedded>,
    },
    Timestamp,
    TimestampReply,
    InfoRequest,
    InfoReply,
    AddressMaskRequest,
    AddressMaskReply { mask: Option<u32> },
    Unknown { kind: u8, code: u8 },
}

impl Message {
    /// The offending datagram quoted by an error message, if any.
    pub fn embedded(&self) -> Option<&Embedded> {
        match self {
            Message::DestinationUnreachable { embedded, .. }
            | Message::SourceQuench { embedded }
            | Message::Redirect { embedded, .. }
            | Message::TimeExceeded { embedded, .. }
            | Message::ParameterProblem { embedded, .. } => embedded.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub ident: u16,
    pub seq: u16,
    pub payload: Vec<u8>,
}

impl Echo {
    pub fn text(&self) -> String {
        printable(&self.payload)
    }
}

/// Renders bytes as text, escaping everything but printable ASCII and
/// newline as `\xNN`.
pub fn printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..=0x7e).contains(&b) || b == b'\n' {
            out.push(b as char);
        } else {
            // Writing to a String cannot fail.
            let _ = write!(out, "\\x{:x}", b);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embedded {
    pub header: Ipv4Header,
    pub ports: Option<Ports>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ports {
    pub transport: Transport,
    pub source: u16,
    pub destination: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreachableCode {
    NetUnreachable,
    HostUnreachable,
    ProtocolUnreachable,
    PortUnreachable,
    FragmentationNeeded,
    SourceRouteFailed,
    NetUnknown,
    HostUnknown,
    SourceIsolated,
    NetProhibited,
    HostProhibited,
    NetUnreachableForTos,
    HostUnreachableForTos,
    FilterProhibited,
    HostPrecedenceViolation,
    PrecedenceCutoff,
    Unknown(u8),
}

const UNREACHABLE_CODES: [UnreachableCode; 16] = [
    UnreachableCode::NetUnreachable,
    UnreachableCode::HostUnreachable,
    UnreachableCode::ProtocolUnreachable,
    UnreachableCode::PortUnreachable,
    UnreachableCode::FragmentationNeeded,
    UnreachableCode::SourceRouteFailed,
    UnreachableCode::NetUnknown,
    UnreachableCode::HostUnknown,
    UnreachableCode::SourceIsolated,
    UnreachableCode::NetProhibited,
    UnreachableCode::HostProhibited,
    UnreachableCode::NetUnreachableForTos,
    UnreachableCode::HostUnreachableForTos,
    UnreachableCode::FilterProhibited,
    UnreachableCode::HostPrecedenceViolation,
    UnreachableCode::PrecedenceCutoff,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectCode {
    Network,
    Host,
    TosNetwork,
    TosHost,
    Unknown(u8),
}

const REDIRECT_CODES: [RedirectCode; 4] = [
    RedirectCode::Network,
    RedirectCode::Host,
    RedirectCode::TosNetwork,
    RedirectCode::TosHost,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExceededCode {
    InTransit,
    Reassembly,
    Unknown(u8),
}

const TIME_EXCEEDED_CODES: [TimeExceededCode; 2] =
    [TimeExceededCode::InTransit, TimeExceededCode::Reassembly];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterProblemCode {
    PointerIndicatesError,
    MissingOption,
    BadLength,
    Unknown(u8),
}

const PARAMETER_PROBLEM_CODES: [ParameterProblemCode; 3] = [
    ParameterProblemCode::PointerIndicatesError,
    ParameterProblemCode::MissingOption,
    ParameterProblemCode::BadLength,
];

fn lookup<T: Copy>(table: &[T], code: u8, unknown: fn(u8) -> T) -> T {
    table
        .get(code as usize)
        .copied()
        .unwrap_or_else(|| unknown(code))
}

/// ICMP fields past type and checksum.
struct Fields<'a> {
    code: u8,
    rest: [u8; 4],
    body: &'a [u8],
}

impl Fields<'_> {
    fn rest_u16(&self, at: usize) -> u16 {
        u16::from_be_bytes([self.rest[at], self.rest[at + 1]])
    }

    fn echo(&self) -> Echo {
        Echo {
            ident: self.rest_u16(0),
            seq: self.rest_u16(2),
            payload: self.body.to_vec(),
        }
    }
}

type Decode = fn(&Fields<'_>, &mut Vec<Warning>) -> Message;

/// One entry per documented ICMP type; anything else is `Message::Unknown`.
const DISPATCH: &[(u8, Decode)] = &[
    (icmp::ECHO_REPLY, echo_reply),
    (icmp::DEST_UNREACH, dest_unreachable),
    (icmp::SOURCE_QUENCH, source_quench),
    (icmp::REDIRECT, redirect),
    (icmp::ECHO_REQUEST, echo_request),
    (icmp::ROUTER_ADVERT, router_advert),
    (icmp::ROUTER_SOLICIT, router_solicit),
    (icmp::TIME_EXCEEDED, time_exceeded),
    (icmp::PARAMETER_PROBLEM, parameter_problem),
    (icmp::TIMESTAMP, timestamp),
    (icmp::TIMESTAMP_REPLY, timestamp_reply),
    (icmp::INFO_REQUEST, info_request),
    (icmp::INFO_REPLY, info_reply),
    (icmp::ADDRESS_MASK_REQUEST, address_mask_request),
    (icmp::ADDRESS_MASK_REPLY, address_mask_reply),
];

fn echo_request(f: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    Message::EchoRequest(f.echo())
}

fn router_advert(f: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    Message::RouterAdvertisement {
        count: f.rest[0],
        lifetime: f.rest_u16(2),
    }
}

fn router_solicit(_: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    Message::RouterSolicitation
}

fn timestamp(_: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    Message::Timestamp
}

fn timestamp_reply(_: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    Message::TimestampReply
}

fn info_request(_: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    Message::InfoRequest
}

fn info_reply(_: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    Message::InfoReply
}

fn address_mask_request(_: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    Message::AddressMaskRequest
}

fn address_mask_reply(f: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    Message::AddressMaskReply {
        mask: Reader::new(f.body).read_u32().ok(),
    }
}

fn echo_reply(f: &Fields<'_>, _: &mut Vec<Warning>) -> Message {
    let echo = f.echo();
    if echo.ident != PAIRING_ID {
        return Message::ForeignReply {
            ident: echo.ident,
            seq: echo.seq,
        };
    }
    Message::EchoReply(echo)
}

fn dest_unreachable(f: &Fields<'_>, warnings: &mut Vec<Warning>) -> Message {
    let code = lookup(&UNREACHABLE_CODES, f.code, UnreachableCode::Unknown);
    let next_hop_mtu = match (code, f.rest_u16(2)) {
        (UnreachableCode::FragmentationNeeded, mtu) if mtu != 0 => Some(mtu),
        _ => None,
    };
    Message::DestinationUnreachable {
        code,
        next_hop_mtu,
        embedded: embedded(f.body, warnings),
    }
}

fn source_quench(f: &Fields<'_>, warnings: &mut Vec<Warning>) -> Message {
    Message::SourceQuench {
        embedded: embedded(f.body, warnings),
    }
}

fn redirect(f: &Fields<'_>, warnings: &mut Vec<Warning>) -> Message {
    Message::Redirect {
        code: lookup(&REDIRECT_CODES, f.code, RedirectCode::Unknown),
        gateway: Ipv4Addr::from(f.rest),
        embedded: embedded(f.body, warnings),
    }
}

fn time_exceeded(f: &Fields<'_>, warnings: &mut Vec<Warning>) -> Message {
    Message::TimeExceeded {
        code: lookup(&TIME_EXCEEDED_CODES, f.code, TimeExceededCode::Unknown),
        embedded: embedded(f.body, warnings),
    }
}

fn parameter_problem(f: &Fields<'_>, warnings: &mut Vec<Warning>) -> Message {
    Message::ParameterProblem {
        code: lookup(
            &PARAMETER_PROBLEM_CODES,
            f.code,
            ParameterProblemCode::Unknown,
        ),
        pointer: f.rest[0],
        embedded: embedded(f.body, warnings),
    }
}

/// Decodes the offending IPv4 header quoted after an error message and,
/// for TCP and UDP, the two ports that follow it.
fn embedded(body: &[u8], warnings: &mut Vec<Warning>) -> Option<Embedded> {
    let mut r = Reader::new(body);
    let header = match Ipv4Header::decode(&mut r) {
        Ok(header) => header,
        Err(e) => {
            warnings.push(Warning::EmbeddedUnreadable(e));
            return None;
        }
    };

    let transport = match header.protocol {
        ipv4::PROTO_TCP => Some(Transport::Tcp),
        ipv4::PROTO_UDP => Some(Transport::Udp),
        _ => None,
    };
    let ports = transport.and_then(|transport| {
        Some(Ports {
            transport,
            source: r.read_u16().ok()?,
            destination: r.read_u16().ok()?,
        })
    });

    Some(Embedded { header, ports })
}

/// Validates `raw` as an IPv4 datagram carrying ICMP and classifies the
/// message.
///
/// Every malformed input ends in a `ParseError`; nothing here indexes past
/// the received bytes.
pub fn classify(raw: &[u8]) -> Result<Descriptor, ParseError> {
    if raw.len() < ipv4::MIN_HEADER_LEN {
        return Err(ParseError::TooShort { len: raw.len() });
    }

    let mut peek = Reader::new(raw);
    let vihl = peek.read_u8()?;
    peek.skip(1)?;
    let declared = peek.read_u16()?;

    let version = vihl >> 4;
    if version != 4 {
        return Err(ParseError::NotIpv4 { version });
    }
    let ihl = vihl & 0x0f;
    let header_len = ihl as usize * 4;
    if header_len < ipv4::MIN_HEADER_LEN {
        return Err(ParseError::BadHeaderLength { ihl });
    }

    let mut warnings = Vec::new();
    let mut len = raw.len();
    if declared as usize != raw.len() {
        warnings.push(Warning::LengthMismatch {
            declared,
            received: raw.len(),
        });
        len = len.min(declared as usize);
    }
    if len < header_len {
        return Err(ParseError::HeaderTruncated { header_len, len });
    }
    let packet = &raw[..len];

    let mut r = Reader::new(packet);
    let ip = Ipv4Header::decode(&mut r)?;
    if ip.protocol != ipv4::PROTO_ICMP {
        return Err(ParseError::NotIcmp {
            protocol: ip.protocol,
        });
    }
    if !verify(&packet[..header_len]) {
        warnings.push(Warning::IpChecksum);
    }

    let message = r.rest();
    if message.len() < icmp::HEADER_LEN {
        return Err(ParseError::IcmpTooShort { len: message.len() });
    }
    if !verify(message) {
        warnings.push(Warning::IcmpChecksum);
    }

    let mut r = Reader::new(message);
    let kind = r.read_u8()?;
    let code = r.read_u8()?;
    r.skip(2)?;
    let mut rest = [0u8; 4];
    rest.copy_from_slice(r.take(4)?);
    let fields = Fields {
        code,
        rest,
        body: r.rest(),
    };

    let message = match DISPATCH.iter().find(|(k, _)| *k == kind) {
        Some((_, decode)) => decode(&fields, &mut warnings),
        None => Message::Unknown { kind, code },
    };

    Ok(Descriptor {
        ip,
        message,
        warnings,
    })
}
