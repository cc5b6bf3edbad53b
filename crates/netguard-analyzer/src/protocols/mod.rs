//! Protocol Inspectors
//!
//! Stateless decoders for DNS questions and TLS ClientHello messages.
//! Neither inspector fails: a payload it cannot make sense of simply yields
//! no evidence (DNS) or a malformed marker (TLS).

pub mod dns;
pub mod tls;

pub use dns::DnsRecord;
pub use tls::TlsIndicators;

/// Read a big-endian u16 at `pos`; caller guarantees bounds.
#[inline(always)]
pub(crate) fn be16(data: &[u8], pos: usize) -> u16 {
    ((data[pos] as u16) << 8) | (data[pos + 1] as u16)
}
