use thiserror::Error;

/// Failure to decode a fixed-width field at a given offset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated at offset {offset}: need {needed} bytes, {remaining} left")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("unsupported IP version {0}")]
    BadVersion(u8),

    #[error("IP header length of {0} words is below the minimum of 5")]
    BadHeaderLength(u8),
}

/// Reasons an inbound datagram is dropped before it is classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("packet is too short ({len} bytes)")]
    TooShort { len: usize },

    #[error("not an IPv4 packet (version {version})")]
    NotIpv4 { version: u8 },

    #[error("invalid IP header length field {ihl}")]
    BadHeaderLength { ihl: u8 },

    #[error("IP header claims {header_len} bytes but only {len} were received")]
    HeaderTruncated { header_len: usize, len: usize },

    #[error("not an ICMP packet (protocol {protocol})")]
    NotIcmp { protocol: u8 },

    #[error("ICMP message is too short ({len} bytes)")]
    IcmpTooShort { len: usize },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("cannot set the receive buffer size (tried down to {min} bytes)")]
    NoUsableBuffer { min: usize },
}
