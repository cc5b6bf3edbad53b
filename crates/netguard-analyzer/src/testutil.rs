//! Packet and session builders shared by unit tests

use crate::session::SessionSnapshot;
use std::time::{Duration, Instant};

pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

/// DNS query payload with a single question
pub fn dns_query(name: &str, qtype: u16) -> Vec<u8> {
    let mut out = vec![
        0x12, 0x34, // id
        0x01, 0x00, // flags: RD
        0x00, 0x01, // qdcount
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    for label in name.split('.').filter(|l| !l.is_empty()) {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out.extend_from_slice(&qtype.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out
}

/// TLS 1.2 ClientHello record
pub fn client_hello(sni: Option<&str>, ciphers: usize) -> Vec<u8> {
    let mut body = vec![0x03, 0x03];
    body.extend_from_slice(&[0x5A; 32]);
    body.push(0); // session id
    body.extend_from_slice(&((ciphers * 2) as u16).to_be_bytes());
    for i in 0..ciphers {
        body.extend_from_slice(&(0xC02F_u16.wrapping_add(i as u16)).to_be_bytes());
    }
    body.extend_from_slice(&[0x01, 0x00]); // null compression

    let mut extensions = Vec::new();
    match sni {
        Some(name) => {
            let name = name.as_bytes();
            extensions.extend_from_slice(&[0x00, 0x00]);
            extensions.extend_from_slice(&((name.len() + 5) as u16).to_be_bytes());
            extensions.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
            extensions.push(0x00);
            extensions.extend_from_slice(&(name.len() as u16).to_be_bytes());
            extensions.extend_from_slice(name);
        }
        None => {
            // supported_versions: TLS 1.3
            extensions.extend_from_slice(&[0x00, 0x2B, 0x00, 0x03, 0x02, 0x03, 0x04]);
        }
    }
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);

    let mut handshake = vec![0x01];
    handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    handshake.extend_from_slice(&body);

    let mut record = vec![0x16, 0x03, 0x01];
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

fn ipv4_header(src: [u8; 4], dst: [u8; 4], protocol: u8, ttl: u8, l4_len: usize) -> Vec<u8> {
    let total = (20 + l4_len) as u16;
    let mut out = vec![0x45, 0x00];
    out.extend_from_slice(&total.to_be_bytes());
    out.extend_from_slice(&[0x00, 0x00, 0x40, 0x00, ttl, protocol, 0x00, 0x00]);
    out.extend_from_slice(&src);
    out.extend_from_slice(&dst);
    out
}

fn ipv6_header(src: [u8; 16], dst: [u8; 16], next: u8, l4_len: usize) -> Vec<u8> {
    let mut out = vec![0x60, 0x00, 0x00, 0x00];
    out.extend_from_slice(&(l4_len as u16).to_be_bytes());
    out.push(next);
    out.push(64);
    out.extend_from_slice(&src);
    out.extend_from_slice(&dst);
    out
}

pub fn tcp_segment(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(20 + payload.len());
    out.extend_from_slice(&src_port.to_be_bytes());
    out.extend_from_slice(&dst_port.to_be_bytes());
    out.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0]); // seq, ack
    out.extend_from_slice(&[0x50, 0x18, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00]);
    out.extend_from_slice(payload);
    out
}

pub fn udp_datagram(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&src_port.to_be_bytes());
    out.extend_from_slice(&dst_port.to_be_bytes());
    out.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    out.extend_from_slice(&[0x00, 0x00]);
    out.extend_from_slice(payload);
    out
}

pub fn ipv4_tcp(
    src: [u8; 4],
    dst: [u8; 4],
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    ipv4_tcp_ttl(src, dst, src_port, dst_port, 64, payload)
}

pub fn ipv4_tcp_ttl(
    src: [u8; 4],
    dst: [u8; 4],
    src_port: u16,
    dst_port: u16,
    ttl: u8,
    payload: &[u8],
) -> Vec<u8> {
    let l4 = tcp_segment(src_port, dst_port, payload);
    let mut out = ipv4_header(src, dst, PROTO_TCP, ttl, l4.len());
    out.extend_from_slice(&l4);
    out
}

pub fn ipv4_udp(
    src: [u8; 4],
    dst: [u8; 4],
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let l4 = udp_datagram(src_port, dst_port, payload);
    let mut out = ipv4_header(src, dst, PROTO_UDP, 64, l4.len());
    out.extend_from_slice(&l4);
    out
}

pub fn ipv6_tcp(
    src: [u8; 16],
    dst: [u8; 16],
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let l4 = tcp_segment(src_port, dst_port, payload);
    let mut out = ipv6_header(src, dst, PROTO_TCP, l4.len());
    out.extend_from_slice(&l4);
    out
}

pub fn ipv6_udp(
    src: [u8; 16],
    dst: [u8; 16],
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let l4 = udp_datagram(src_port, dst_port, payload);
    let mut out = ipv6_header(src, dst, PROTO_UDP, l4.len());
    out.extend_from_slice(&l4);
    out
}

pub const DEVICE: [u8; 4] = [10, 0, 0, 2];
pub const REMOTE: [u8; 4] = [93, 184, 216, 34];
pub const V6_DEVICE: [u8; 16] = [0xFD, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];
pub const V6_REMOTE: [u8; 16] = [0x20, 0x01, 0x0D, 0xB8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];

/// Flow of `count` packets over `secs`, `inbound` of them inbound.
/// Payload and timing statistics start at zero.
pub fn flow_snapshot(count: u64, inbound: u64, secs: f64) -> SessionSnapshot {
    let start = Instant::now();
    let mut snap = SessionSnapshot::empty(start);
    snap.packet_count = count;
    snap.burst_packet_count = count;
    snap.inbound_packets = inbound;
    snap.outbound_packets = count - inbound;
    snap.inter_arrival_samples = count.saturating_sub(1);
    snap.last_seen = start + Duration::from_secs_f64(secs);
    snap
}
