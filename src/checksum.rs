//! Internet checksum (RFC 1071).

/// Computes the one's-complement checksum of `data`.
///
/// Words are read big-endian; a trailing odd byte is padded with a zero low
/// byte. Running it over a buffer that already holds a valid checksum
/// yields 0.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    if let [last] = words.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }

    sum = (sum >> 16) + (sum & 0xffff);
    sum += sum >> 16;
    !(sum as u16)
}

/// True when `data`, checksum field included, folds to zero.
pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}
