//! Packet Parser
//!
//! Decodes one captured IP packet into an immutable [`PacketContext`].
//! Structural failures never abort: they are recorded as an
//! [`IntegrityViolation`] and the context is returned tampered and invalid.
//!
//! IPv6 extension headers are not walked; `next header` is trusted directly,
//! so TCP/UDP behind an extension header is reported as `OTHER`.

use crate::integrity::{
    check_header_len, check_min_len, EnvironmentTrust, IPV4_MIN_HEADER, IPV6_HEADER,
    TCP_MIN_HEADER, UDP_HEADER,
};
use crate::protocols::{be16, dns, tls, DnsRecord, TlsIndicators};
use crate::IntegrityViolation;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// RFC 791 ceiling; larger captures are flagged truncated
pub const MAX_PACKET_SIZE: usize = 65535;

/// Bytes fed to the entropy estimate
pub const ENTROPY_WINDOW: usize = 512;

/// DNS port
pub const DNS_PORT: u16 = 53;

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

/// Transport protocol
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    #[default]
    Other,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traffic direction, inferred from address privacy only
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    #[default]
    Outbound,
    Lan,
}

impl Direction {
    /// Classify an IPv4 pair: public destination is outbound, private
    /// destination with public source is inbound, otherwise LAN.
    pub fn classify_v4(src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        if !is_private_v4(dst) {
            Self::Outbound
        } else if !is_private_v4(src) {
            Self::Inbound
        } else {
            Self::Lan
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
            Self::Lan => "lan",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 1918 or loopback
#[inline]
pub fn is_private_v4(addr: Ipv4Addr) -> bool {
    addr.is_private() || addr.is_loopback()
}

/// Per-packet facts, fixed once parsing completes
#[derive(Clone, Debug, Default)]
pub struct PacketContext {
    /// Decoded without structural violations
    pub valid: bool,
    /// Capture exceeds the RFC 791 ceiling
    pub truncated: bool,
    /// Structural violation found
    pub tampered: bool,
    /// Environment-trust probe failed
    pub hook_suspected: bool,
    /// What made the packet tampered, if anything
    pub violation: Option<IntegrityViolation>,
    /// Captured bytes
    pub length: usize,
    /// Bytes after L3/L4 headers
    pub payload_length: usize,
    /// CRC-32 over at most [`MAX_PACKET_SIZE`] bytes
    pub checksum: u32,
    /// Shannon entropy (bits/byte) of the first [`ENTROPY_WINDOW`] bytes
    pub entropy: f64,
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub protocol: Protocol,
    pub direction: Direction,
    pub src_port: u16,
    pub dst_port: u16,
    /// TTL / hop limit
    pub hop_limit: u8,
    /// Cleanly decoded DNS question
    pub dns: Option<DnsRecord>,
    /// TLS inspection outcome, when attempted
    pub tls: Option<TlsIndicators>,
}

impl PacketContext {
    /// TCP with a well-known TLS port on either side
    pub fn is_tls_flow(&self) -> bool {
        self.protocol == Protocol::Tcp
            && (tls::is_tls_port(self.src_port) || tls::is_tls_port(self.dst_port))
    }

    /// Well-formed ClientHello carried by this packet
    pub fn clean_client_hello(&self) -> Option<&TlsIndicators> {
        self.tls.as_ref().filter(|t| t.is_clean_client_hello())
    }

    pub fn is_client_hello(&self) -> bool {
        self.tls.as_ref().map(|t| t.client_hello).unwrap_or(false)
    }
}

/// Packet parser
pub struct PacketParser {
    trust: Arc<dyn EnvironmentTrust>,
}

impl PacketParser {
    /// Create new parser
    pub fn new(trust: Arc<dyn EnvironmentTrust>) -> Self {
        Self { trust }
    }

    /// Decode one captured packet
    pub fn parse(&self, bytes: &[u8]) -> PacketContext {
        let mut ctx = PacketContext {
            length: bytes.len(),
            hook_suspected: !self.trust.is_trusted(),
            ..Default::default()
        };

        if let Err(violation) = decode(bytes, &mut ctx) {
            ctx.tampered = true;
            ctx.violation = Some(violation);
            return ctx;
        }

        ctx.valid = true;
        ctx.entropy = shannon_entropy(&bytes[..bytes.len().min(ENTROPY_WINDOW)]);
        ctx
    }
}

fn decode(bytes: &[u8], ctx: &mut PacketContext) -> Result<(), IntegrityViolation> {
    if bytes.is_empty() {
        return Err(IntegrityViolation::EmptyPacket);
    }

    ctx.truncated = bytes.len() > MAX_PACKET_SIZE;
    ctx.checksum = crc32fast::hash(&bytes[..bytes.len().min(MAX_PACKET_SIZE)]);

    let (next_proto, header_len) = match bytes[0] >> 4 {
        4 => decode_ipv4(bytes, ctx)?,
        6 => decode_ipv6(bytes, ctx)?,
        version => return Err(IntegrityViolation::UnsupportedVersion(version)),
    };

    decode_transport(next_proto, &bytes[header_len..], ctx)
}

fn decode_ipv4(bytes: &[u8], ctx: &mut PacketContext) -> Result<(u8, usize), IntegrityViolation> {
    check_min_len("IPv4", IPV4_MIN_HEADER, bytes.len())?;
    let ihl = ((bytes[0] & 0x0F) as usize) * 4;
    let header_len = check_header_len("IPv4", ihl, IPV4_MIN_HEADER, bytes.len())?;

    let src = Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]);
    let dst = Ipv4Addr::new(bytes[16], bytes[17], bytes[18], bytes[19]);

    ctx.src_ip = Some(IpAddr::V4(src));
    ctx.dst_ip = Some(IpAddr::V4(dst));
    ctx.hop_limit = bytes[8];
    ctx.direction = Direction::classify_v4(src, dst);

    Ok((bytes[9], header_len))
}

fn decode_ipv6(bytes: &[u8], ctx: &mut PacketContext) -> Result<(u8, usize), IntegrityViolation> {
    check_min_len("IPv6", IPV6_HEADER, bytes.len())?;

    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&bytes[8..24]);
    dst.copy_from_slice(&bytes[24..40]);

    ctx.src_ip = Some(IpAddr::V6(Ipv6Addr::from(src)));
    ctx.dst_ip = Some(IpAddr::V6(Ipv6Addr::from(dst)));
    ctx.hop_limit = bytes[7];

    Ok((bytes[6], IPV6_HEADER))
}

fn decode_transport(
    next_proto: u8,
    l4: &[u8],
    ctx: &mut PacketContext,
) -> Result<(), IntegrityViolation> {
    ctx.payload_length = l4.len();

    match next_proto {
        IPPROTO_TCP if l4.len() >= TCP_MIN_HEADER => {
            ctx.protocol = Protocol::Tcp;
            ctx.src_port = be16(l4, 0);
            ctx.dst_port = be16(l4, 2);

            let data_offset = ((l4[12] >> 4) as usize) * 4;
            let header_len = check_header_len("TCP", data_offset, TCP_MIN_HEADER, l4.len())?;
            let payload = &l4[header_len..];
            ctx.payload_length = payload.len();

            if ctx.is_tls_flow() && payload.len() >= tls::MIN_RECORD_PREFIX {
                ctx.tls = Some(tls::inspect(payload));
            }
        }
        IPPROTO_UDP if l4.len() >= UDP_HEADER => {
            ctx.protocol = Protocol::Udp;
            ctx.src_port = be16(l4, 0);
            ctx.dst_port = be16(l4, 2);

            let payload = &l4[UDP_HEADER..];
            ctx.payload_length = payload.len();

            if ctx.src_port == DNS_PORT || ctx.dst_port == DNS_PORT {
                let record = dns::parse_query(payload);
                ctx.dns = record.ok.then_some(record);
            }
        }
        _ => {}
    }

    Ok(())
}

/// Shannon entropy in bits per byte, within [0, 8]
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut freq = [0u32; 256];
    for &byte in data {
        freq[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;

    for &count in &freq {
        if count > 0 {
            let p = (count as f64) / len;
            entropy -= p * p.log2();
        }
    }

    entropy
}
