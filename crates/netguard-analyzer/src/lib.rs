//! NetGuard Packet Analyzer
//!
//! Real-time, on-device traffic risk classifier. Each captured packet
//! (raw bytes from a local VPN/tun capture) is decoded, correlated with the
//! recent history of its flow and scored.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ─▶ PacketParser ─▶ PacketContext ─▶ SessionTracker::register
//!                                               │
//!                                               ▼
//!          AnalysisRecord ◀─ output ◀─ RiskVerdict ◀─ risk::evaluate(ctx, snapshot)
//! ```
//!
//! - **Protocol Inspectors**: DNS question and TLS ClientHello decoding
//! - **Integrity Guard**: structural validity and environment trust
//! - **Session Tracker**: bounded, time-expiring per-flow statistics
//! - **Risk Engine**: bucketed heuristics, calibration and label downgrade
//!
//! Parsing and scoring never fail: every call produces a complete result,
//! malformed input included.

#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod integrity;
pub mod output;
pub mod parser;
pub mod protocols;
pub mod risk;
pub mod rules;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AnalyzerConfig, IntegrityConfig, SessionConfig};
pub use engine::{AnalysisResult, AnalyzerStats, PacketAnalyzer};
pub use error::{AnalyzerError, IntegrityViolation, Result};
pub use integrity::{EnvironmentTrust, ExecutableOriginTrust, FixedTrust};
pub use output::AnalysisRecord;
pub use parser::{Direction, PacketContext, PacketParser, Protocol};
pub use protocols::{DnsRecord, TlsIndicators};
pub use risk::{RiskAssessment, RiskLabel, RiskVerdict};
pub use rules::{InMemoryRuleStore, RuleStore};
pub use session::{FlowKey, SessionSnapshot, SessionTracker};
