//! Heuristic groups feeding the three evidence buckets

use super::{Bucket, RiskAssessment, ABSOLUTE_HIGH_SCORE};
use crate::parser::{Direction, PacketContext, Protocol};
use crate::protocols::dns::{QTYPE_ANY, QTYPE_OPT};
use crate::protocols::tls::TLS_1_2;
use crate::session::SessionSnapshot;

/// Ports that are almost never legitimate from a mobile app
pub const SENSITIVE_PORTS: [u16; 10] = [21, 22, 23, 25, 135, 137, 138, 139, 445, 3389];

const DNS_PORT: u16 = 53;
const EPHEMERAL_PORT_START: u16 = 49152;
const LARGE_EPHEMERAL_PAYLOAD: usize = 1000;

const DNS_TUNNEL_QNAME_LEN: usize = 80;
const DNS_MAX_HYPHENS: usize = 5;

const MAX_CIPHER_SUITES: usize = 140;
const NUMERIC_SNI_MIN_LEN: usize = 40;

const OVERSIZED_TCP_PAYLOAD: usize = 1400;
const LOW_TTL: u8 = 32;

const HIGH_ENTROPY: f64 = 7.5;
const HIGH_ENTROPY_MIN_PAYLOAD: usize = 200;
const INBOUND_ENTROPY: f64 = 6.5;
const INBOUND_ENTROPY_MIN_PAYLOAD: usize = 512;

// Long-lived, two-way flow: the gate for the strong behavioural branches
const SUSTAINED_SECS: f64 = 6.0;
const SUSTAINED_BIDIRECTIONAL_SHARE: f64 = 0.25;

const LARGE_TRANSFER_BYTES: u64 = 2 * 1024 * 1024;

/// Score one packet in the light of its flow
pub fn assess(ctx: &PacketContext, session: &SessionSnapshot) -> RiskAssessment {
    let mut risk = RiskAssessment::default();

    if !ctx.valid {
        risk.confirm();
        risk.raise(Bucket::Primary, ABSOLUTE_HIGH_SCORE, "Malformed or unsupported packet");
        apply_integrity(ctx, &mut risk);
        return risk;
    }

    apply_ports(ctx, &mut risk);
    apply_dns(ctx, &mut risk);
    apply_tls(ctx, &mut risk);
    apply_behavior(ctx, session, &mut risk);
    apply_payload(ctx, &mut risk);
    apply_integrity(ctx, &mut risk);

    risk
}

fn apply_ports(ctx: &PacketContext, risk: &mut RiskAssessment) {
    let port = ctx.dst_port;

    if SENSITIVE_PORTS.contains(&port) {
        risk.confirm();
        risk.raise(Bucket::Primary, 0.92, "Sensitive service port");
    } else if port == DNS_PORT {
        risk.raise_if_unexplained(Bucket::Primary, 0.55, "DNS communication");
    } else if port == 80 || port == 443 {
        risk.raise_if_unexplained(Bucket::Primary, 0.5, "HTTP/HTTPS traffic");
    } else if port != 0 && port < 1024 {
        risk.raise_if_unexplained(Bucket::Primary, 0.65, "Privileged port");
        risk.raise(Bucket::Secondary, 0.35, "Privileged port anomaly");
    }

    if ctx.dst_port == 0 || ctx.src_port == 0 {
        risk.raise(Bucket::Secondary, 0.6, "Null port detected");
    }

    if port >= EPHEMERAL_PORT_START && ctx.payload_length > LARGE_EPHEMERAL_PAYLOAD {
        risk.raise_if_unexplained(Bucket::Secondary, 0.58, "Large transfer to dynamic port");
    }
}

fn apply_dns(ctx: &PacketContext, risk: &mut RiskAssessment) {
    let Some(dns) = &ctx.dns else {
        return;
    };

    if dns.qname.len() > DNS_TUNNEL_QNAME_LEN {
        risk.raise(Bucket::Primary, 0.72, "Oversized DNS query name");
        risk.raise(Bucket::Secondary, 0.68, "Potential DNS tunneling");
    }

    if dns.qtype == QTYPE_ANY || dns.qtype == QTYPE_OPT {
        risk.raise_if_unexplained(Bucket::Primary, 0.6, "Suspicious DNS query");
    }

    if dns.hyphen_count() > DNS_MAX_HYPHENS || dns.has_service_label() {
        risk.raise_if_unexplained(Bucket::Secondary, 0.55, "DNS pattern anomaly");
    }

    if dns.qname.is_empty() {
        risk.raise(Bucket::Secondary, 0.65, "Empty DNS query");
    }
}

fn apply_tls(ctx: &PacketContext, risk: &mut RiskAssessment) {
    let Some(tls) = ctx.tls.as_ref().filter(|t| t.parsed) else {
        return;
    };

    if tls.client_hello && tls.malformed {
        risk.confirm();
        risk.raise(Bucket::Primary, ABSOLUTE_HIGH_SCORE, "Malformed TLS ClientHello");
        return;
    }

    if !tls.client_hello {
        return;
    }

    if tls.version < TLS_1_2 {
        risk.raise(Bucket::Secondary, 0.68, "Legacy TLS version offered");
    }

    if tls.cipher_count == 0 {
        risk.raise(Bucket::Secondary, 0.7, "ClientHello without cipher suites");
    } else if tls.cipher_count > MAX_CIPHER_SUITES {
        risk.raise(Bucket::Primary, 0.83, "Excessive cipher suites offered");
    }

    if let Some(sni) = &tls.server_name {
        let len = sni.chars().count();
        let digits = sni.chars().filter(|c| c.is_ascii_digit()).count();
        if len > NUMERIC_SNI_MIN_LEN && digits * 2 > len {
            risk.raise(Bucket::Secondary, 0.76, "Numeric TLS server name");
        }
    }
}

fn apply_behavior(ctx: &PacketContext, session: &SessionSnapshot, risk: &mut RiskAssessment) {
    let small_ratio = session.small_ratio();
    let duration = session.duration_secs();
    let sustained = duration > SUSTAINED_SECS
        && session.bidirectional_share() > SUSTAINED_BIDIRECTIONAL_SHARE;

    if ctx.protocol == Protocol::Tcp {
        if ctx.payload_length == 0 && session.burst_packet_count > 6 {
            risk.raise(Bucket::Correlation, 0.65, "Repeated empty TCP frames");
        }
        if ctx.payload_length > OVERSIZED_TCP_PAYLOAD {
            risk.raise_if_unexplained(Bucket::Secondary, 0.6, "Oversized TCP payload");
        }
    }

    // Sustained stream of small, tightly spaced packets
    if session.packet_count > 24
        && small_ratio > 0.88
        && session.inter_arrival_mean_ms < 120.0
        && session.inter_arrival_stddev_ms < 18.0
    {
        if sustained {
            risk.raise(Bucket::Correlation, 0.82, "Persistent low-latency stream");
        } else if session.packet_count > 40 && duration > 3.5 {
            risk.raise(Bucket::Correlation, 0.68, "Low-latency stream watchlist");
        }
    }

    // Small uniform payloads at steady cadence
    if session.packet_count > 12
        && small_ratio > 0.7
        && session.payload_mean < 180.0
        && session.payload_stddev < 60.0
    {
        if sustained {
            risk.raise(Bucket::Correlation, 0.82, "Beacon-like session");
        } else if session.packet_count > 20 && duration > 2.0 {
            risk.raise(Bucket::Correlation, 0.7, "Possible beaconing");
        }
    }

    if session.burst_packet_count > 6
        && session.burst_small_ratio() > 0.85
        && session.inter_arrival_samples >= 3
        && session.inter_arrival_stddev_ms < 15.0
    {
        if session.bidirectional_share() > SUSTAINED_BIDIRECTIONAL_SHARE
            && session.inter_arrival_samples >= 5
        {
            risk.raise(Bucket::Correlation, 0.84, "Short-burst command channel");
        } else {
            risk.raise(Bucket::Correlation, 0.64, "Short command-like burst");
        }
    }

    if session.total_bytes > LARGE_TRANSFER_BYTES && small_ratio > 0.55 {
        if sustained {
            risk.raise(Bucket::Primary, 0.78, "Sustained large transfer");
        } else if session.packet_count > 30 {
            risk.raise(Bucket::Primary, 0.7, "Large transfer");
        }
    }

    if session.inter_arrival_samples >= 8
        && session.inter_arrival_mean_ms < 70.0
        && session.inter_arrival_stddev_ms < 10.0
        && small_ratio > 0.55
    {
        if sustained {
            risk.raise(Bucket::Correlation, 0.84, "Highly periodic timing");
        } else {
            risk.raise(Bucket::Correlation, 0.7, "Periodic timing");
        }
    }

    if ctx.hop_limit != 0 && ctx.hop_limit < LOW_TTL && ctx.direction == Direction::Inbound {
        risk.raise(Bucket::Secondary, 0.62, "Low TTL inbound packet");
    }

    if session.inbound_packets > 0 && session.outbound_packets == 0 && session.packet_count > 8 {
        let floor = if duration > 5.0 { 0.66 } else { 0.5 };
        risk.raise(Bucket::Secondary, floor, "Inbound-only session");
    }

    if session.outbound_packets > 0 && session.inbound_packets == 0 && session.packet_count > 30 {
        let floor = if duration > SUSTAINED_SECS && small_ratio > 0.8 {
            0.8
        } else {
            0.68
        };
        risk.raise(Bucket::Primary, floor, "Outbound-only session");
    }

    if ctx.direction == Direction::Outbound
        && ctx.is_client_hello()
        && ctx.tls.as_ref().is_some_and(|t| t.server_name.is_none())
    {
        risk.raise(Bucket::Secondary, 0.72, "TLS ClientHello without SNI");
    }
}

/// Entropy checks on cleartext flows; encrypted ports are expected to be noisy
fn apply_payload(ctx: &PacketContext, risk: &mut RiskAssessment) {
    if ctx.is_tls_flow() {
        return;
    }

    if ctx.entropy > HIGH_ENTROPY && ctx.payload_length > HIGH_ENTROPY_MIN_PAYLOAD {
        risk.raise(Bucket::Secondary, 0.7, "High-entropy payload");
    }

    if ctx.direction == Direction::Inbound
        && ctx.payload_length > INBOUND_ENTROPY_MIN_PAYLOAD
        && ctx.entropy > INBOUND_ENTROPY
    {
        risk.raise(Bucket::Secondary, 0.7, "High-entropy inbound payload");
    }
}

fn apply_integrity(ctx: &PacketContext, risk: &mut RiskAssessment) {
    if ctx.tampered || ctx.hook_suspected {
        risk.confirm();
        risk.raise(Bucket::Correlation, 0.95, "Integrity or hooking detection");
    }
}
