//! Human-readable rendering of classified datagrams.

use std::fmt;

use crate::classify::{
    Descriptor, Message, ParameterProblemCode, Ports, RedirectCode, TimeExceededCode, Transport,
    UnreachableCode, Warning,
};
use crate::icmp;
use crate::ipv4::Ipv4Header;

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(embedded) = self.message.embedded() {
            write!(f, "\n{}", embedded.header)?;
            if let Some(ports) = &embedded.ports {
                write!(f, "\n{}", ports)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::EchoReply(echo) => write!(f, "{}", echo.text()),
            Message::ForeignReply { ident, .. } => write!(f, "Not our id : {:x}", ident),
            Message::EchoRequest(_) => write!(f, "Echo Request"),
            Message::DestinationUnreachable {
                code: UnreachableCode::FragmentationNeeded,
                next_hop_mtu: Some(mtu),
                ..
            } => write!(f, "frag needed and DF set (MTU {})", mtu),
            Message::DestinationUnreachable { code, .. } => write!(f, "{}", code),
            Message::SourceQuench { .. } => write!(f, "Source Quench"),
            Message::Redirect { code, gateway, .. } => {
                write!(f, "{} (New addr: {})", code, gateway)
            }
            Message::RouterAdvertisement { count, lifetime } => write!(
                f,
                "Router Discovery Advertisement\n({} entries, lifetime {} seconds)",
                count, lifetime
            ),
            Message::RouterSolicitation => write!(f, "Router Discovery Solicitation"),
            Message::TimeExceeded { code, .. } => write!(f, "{}", code),
            Message::ParameterProblem { code, pointer, .. } => {
                write!(f, "{}: pointer = 0x{:02x}", code, pointer)
            }
            Message::Timestamp => write!(f, "Timestamp"),
            Message::TimestampReply => write!(f, "Timestamp Reply"),
            Message::InfoRequest => write!(f, "Information Request"),
            Message::InfoReply => write!(f, "Information Reply"),
            Message::AddressMaskRequest => write!(f, "Address Mask Request"),
            Message::AddressMaskReply { mask: Some(mask) } => {
                write!(f, "Address Mask Reply (Mask 0x{:08x})", mask)
            }
            Message::AddressMaskReply { mask: None } => write!(f, "Address Mask Reply"),
            Message::Unknown { kind, code } => {
                write!(f, "Unknown ICMP type: {} (code {})", kind, code)
            }
        }
    }
}

impl fmt::Display for UnreachableCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnreachableCode::NetUnreachable => "Destination Net Unreachable",
            UnreachableCode::HostUnreachable => "Destination Host Unreachable",
            UnreachableCode::ProtocolUnreachable => "Destination Protocol Unreachable",
            UnreachableCode::PortUnreachable => "Destination Port Unreachable",
            UnreachableCode::FragmentationNeeded => "frag needed and DF set",
            UnreachableCode::SourceRouteFailed => "Source Route Failed",
            UnreachableCode::NetUnknown => "Network Unknown",
            UnreachableCode::HostUnknown => "Host Unknown",
            UnreachableCode::SourceIsolated => "Source Isolated",
            UnreachableCode::NetProhibited => "Dest. Net Administratively Prohibited",
            UnreachableCode::HostProhibited => "Dest. Host Administratively Prohibited",
            UnreachableCode::NetUnreachableForTos => "Destination Net Unreachable for TOS",
            UnreachableCode::HostUnreachableForTos => "Destination Host Unreachable for TOS",
            UnreachableCode::FilterProhibited => "Route administratively prohibited",
            UnreachableCode::HostPrecedenceViolation => "Host Precedence Violation",
            UnreachableCode::PrecedenceCutoff => "Precedence Cutoff",
            UnreachableCode::Unknown(code) => return unknown_code(f, *code, icmp::DEST_UNREACH),
        };
        f.write_str(s)
    }
}

impl fmt::Display for RedirectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RedirectCode::Network => "Redirect Network",
            RedirectCode::Host => "Redirect Host",
            RedirectCode::TosNetwork => "Redirect Type of Service and Network",
            RedirectCode::TosHost => "Redirect Type of Service and Host",
            RedirectCode::Unknown(code) => return unknown_code(f, *code, icmp::REDIRECT),
        };
        f.write_str(s)
    }
}

impl fmt::Display for TimeExceededCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeExceededCode::InTransit => "Time to live exceeded",
            TimeExceededCode::Reassembly => "Frag reassembly time exceeded",
            TimeExceededCode::Unknown(code) => return unknown_code(f, *code, icmp::TIME_EXCEEDED),
        };
        f.write_str(s)
    }
}

impl fmt::Display for ParameterProblemCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParameterProblemCode::PointerIndicatesError => "Parameter problem",
            ParameterProblemCode::MissingOption => "Parameter problem, required option absent",
            ParameterProblemCode::BadLength => "Parameter problem, bad length",
            ParameterProblemCode::Unknown(code) => {
                return unknown_code(f, *code, icmp::PARAMETER_PROBLEM);
            }
        };
        f.write_str(s)
    }
}

fn unknown_code(f: &mut fmt::Formatter<'_>, code: u8, kind: u8) -> fmt::Result {
    write!(f, "unknown code {} for type {}", code, kind)
}

/// Column dump of an IPv4 header, option bytes in hex at the end.
impl fmt::Display for Ipv4Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Vr HL TOS  Len   ID Flg  off TTL Pro  cks\tSrc\t\tDst\tData")?;
        write!(
            f,
            "   {:1x}  {:1x}  {:02x} {:04x} {:04x}   {:1x} {:04x}  {:02x}  {:02x} {:04x} {}  {} ",
            self.version,
            self.ihl,
            self.tos,
            self.total_len,
            self.identification,
            self.flags(),
            self.fragment_offset(),
            self.ttl,
            self.protocol,
            self.checksum,
            self.source,
            self.destination,
        )?;
        for b in &self.options {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.transport {
            Transport::Tcp => "TCP",
            Transport::Udp => "UDP",
        };
        write!(
            f,
            "{}: from port {}, to port {} (decimal)",
            name, self.source, self.destination
        )
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::LengthMismatch { declared, received } => write!(
                f,
                "IP length {:x} is different from the gotten one {:x}",
                declared, received
            ),
            Warning::IpChecksum => write!(f, "bad IP header checksum"),
            Warning::IcmpChecksum => write!(f, "bad ICMP checksum"),
            Warning::EmbeddedUnreadable(e) => write!(f, "cannot decode embedded datagram: {}", e),
        }
    }
}
