//! Result Serializer
//!
//! Fixed-schema, camelCase JSON record for one analyzed packet. Optional
//! sections (`src`, `dst`, `appPackage`, `tls`, `dns`, `sni`) are omitted
//! when absent; every other field is always present.

use crate::engine::AnalysisResult;
use crate::parser::{Direction, Protocol};
use crate::risk::RiskLabel;
use crate::Result;
use serde::Serialize;

const NO_REASON: &str = "none";

/// Output record
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub bytes: usize,
    pub crc32: u32,
    pub truncated: bool,
    pub hook_suspected: bool,
    pub integrity_violation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    pub proto: Protocol,
    pub src_port: u16,
    pub dst_port: u16,
    pub direction: Direction,
    pub payload_bytes: usize,
    pub entropy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_package: Option<String>,
    pub hop_limit: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsSection>,
    pub session: SessionSection,
    pub raw_score: f64,
    pub risk_score: f64,
    pub confidence: f64,
    pub risk_label: RiskLabel,
    pub firewall_blocked: bool,
    pub blocked: bool,
    pub tls_downgraded: bool,
    pub assurance: AssuranceSection,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSection {
    pub parsed: bool,
    pub client_hello: bool,
    pub malformed: bool,
    pub cipher_count: usize,
    pub version: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsSection {
    pub qname: String,
    pub qtype: u16,
    pub rcode: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSection {
    pub count: u64,
    pub bytes: u64,
    pub small_payload_ratio: f64,
    pub payload_mean: f64,
    #[serde(rename = "payloadStdDev")]
    pub payload_stddev: f64,
    pub inter_arrival_mean_ms: f64,
    #[serde(rename = "interArrivalStdDevMs")]
    pub inter_arrival_stddev_ms: f64,
    pub inter_arrival_samples: u64,
    pub burst_packets: u64,
    pub burst_small_ratio: f64,
    pub inbound_packets: u64,
    pub outbound_packets: u64,
    pub duration_ms: f64,
    pub tls_handshake_seen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssuranceSection {
    pub primary: String,
    pub secondary: String,
    pub correlation: String,
    pub primary_score: f64,
    pub secondary_score: f64,
    pub correlation_score: f64,
    pub false_negative_guard: bool,
    pub high_risk_confirmed: bool,
}

impl AnalysisRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl From<&AnalysisResult> for AnalysisRecord {
    fn from(result: &AnalysisResult) -> Self {
        let ctx = &result.context;
        let session = &result.session;
        let verdict = &result.verdict;
        let risk = &verdict.assessment;

        Self {
            bytes: ctx.length,
            crc32: ctx.checksum,
            truncated: ctx.truncated,
            hook_suspected: ctx.hook_suspected,
            integrity_violation: ctx.tampered,
            src: ctx.src_ip.map(|ip| ip.to_string()),
            dst: ctx.dst_ip.map(|ip| ip.to_string()),
            proto: ctx.protocol,
            src_port: ctx.src_port,
            dst_port: ctx.dst_port,
            direction: ctx.direction,
            payload_bytes: ctx.payload_length,
            entropy: round4(ctx.entropy),
            app_package: result.identity.clone(),
            hop_limit: ctx.hop_limit,
            tls: ctx.tls.as_ref().map(|tls| TlsSection {
                parsed: tls.parsed,
                client_hello: tls.client_hello,
                malformed: tls.malformed,
                cipher_count: tls.cipher_count,
                version: tls.version,
                server_name: tls.server_name.clone(),
            }),
            dns: ctx.dns.as_ref().map(|dns| DnsSection {
                qname: dns.qname.clone(),
                qtype: dns.qtype,
                rcode: dns.rcode,
            }),
            session: SessionSection {
                count: session.packet_count,
                bytes: session.total_bytes,
                small_payload_ratio: round4(session.small_ratio()),
                payload_mean: round4(session.payload_mean),
                payload_stddev: round4(session.payload_stddev),
                inter_arrival_mean_ms: round4(session.inter_arrival_mean_ms),
                inter_arrival_stddev_ms: round4(session.inter_arrival_stddev_ms),
                inter_arrival_samples: session.inter_arrival_samples,
                burst_packets: session.burst_packet_count,
                burst_small_ratio: round4(session.burst_small_ratio()),
                inbound_packets: session.inbound_packets,
                outbound_packets: session.outbound_packets,
                duration_ms: round4(session.duration_secs() * 1000.0),
                tls_handshake_seen: session.tls_handshake_seen,
                sni: session.last_sni.clone(),
            },
            raw_score: round4(verdict.raw_score),
            risk_score: round4(verdict.risk_score),
            confidence: round4(verdict.confidence),
            risk_label: verdict.label,
            firewall_blocked: result.firewall_blocked,
            blocked: result.blocked,
            tls_downgraded: verdict.tls_downgraded,
            assurance: AssuranceSection {
                primary: reason(risk.primary_reason),
                secondary: reason(risk.secondary_reason),
                correlation: reason(risk.correlation_reason),
                primary_score: round4(risk.primary_score),
                secondary_score: round4(risk.secondary_score),
                correlation_score: round4(risk.correlation_score),
                false_negative_guard: risk.possible_false_negative,
                high_risk_confirmed: risk.high_risk_confirmed,
            },
        }
    }
}

fn reason(reason: Option<&'static str>) -> String {
    reason.unwrap_or(NO_REASON).to_string()
}

/// Round to 4 decimal places
#[inline]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
