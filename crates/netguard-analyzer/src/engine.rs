//! Packet Analyzer
//!
//! Orchestrates one analysis call:
//!
//! ```text
//! bytes -> PacketParser -> SessionTracker::register -> risk::evaluate
//!                                                          |
//!                                      RuleStore -> block decision
//! ```
//!
//! Thread-safe and synchronous: `analyze` takes `&self` and the only shared
//! mutable state is the session map inside [`SessionTracker`].

use crate::clock::{Clock, SystemClock};
use crate::config::AnalyzerConfig;
use crate::integrity::{EnvironmentTrust, ExecutableOriginTrust, FixedTrust};
use crate::output::AnalysisRecord;
use crate::parser::{PacketContext, PacketParser};
use crate::risk::{self, RiskLabel, RiskVerdict};
use crate::rules::{InMemoryRuleStore, RuleStore};
use crate::session::{FlowKey, SessionSnapshot, SessionTracker};
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Everything learned about one packet
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    pub context: PacketContext,
    pub session: SessionSnapshot,
    pub verdict: RiskVerdict,
    /// Caller identity (e.g. app package), echoed for audit
    pub identity: Option<String>,
    /// Rule store denied the identity
    pub firewall_blocked: bool,
    /// Final decision: rule-store block or High risk
    pub blocked: bool,
}

impl AnalysisResult {
    pub fn is_high_risk(&self) -> bool {
        self.verdict.label == RiskLabel::High
    }

    /// Fixed-schema output record
    pub fn record(&self) -> AnalysisRecord {
        AnalysisRecord::from(self)
    }

    pub fn to_json(&self) -> Result<String> {
        self.record().to_json()
    }
}

/// Analyzer statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnalyzerStats {
    pub packets_analyzed: u64,
    pub bytes_analyzed: u64,
    pub integrity_violations: u64,
    pub high_risk: u64,
    pub packets_blocked: u64,
    pub tls_downgrades: u64,
}

#[derive(Default)]
struct StatCounters {
    packets_analyzed: AtomicU64,
    bytes_analyzed: AtomicU64,
    integrity_violations: AtomicU64,
    high_risk: AtomicU64,
    packets_blocked: AtomicU64,
    tls_downgrades: AtomicU64,
}

impl StatCounters {
    fn record(&self, result: &AnalysisResult) {
        self.packets_analyzed.fetch_add(1, Ordering::Relaxed);
        self.bytes_analyzed
            .fetch_add(result.context.length as u64, Ordering::Relaxed);
        if result.context.tampered {
            self.integrity_violations.fetch_add(1, Ordering::Relaxed);
        }
        if result.is_high_risk() {
            self.high_risk.fetch_add(1, Ordering::Relaxed);
        }
        if result.blocked {
            self.packets_blocked.fetch_add(1, Ordering::Relaxed);
        }
        if result.verdict.tls_downgraded {
            self.tls_downgrades.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> AnalyzerStats {
        AnalyzerStats {
            packets_analyzed: self.packets_analyzed.load(Ordering::Relaxed),
            bytes_analyzed: self.bytes_analyzed.load(Ordering::Relaxed),
            integrity_violations: self.integrity_violations.load(Ordering::Relaxed),
            high_risk: self.high_risk.load(Ordering::Relaxed),
            packets_blocked: self.packets_blocked.load(Ordering::Relaxed),
            tls_downgrades: self.tls_downgrades.load(Ordering::Relaxed),
        }
    }
}

/// Packet analyzer
pub struct PacketAnalyzer {
    config: AnalyzerConfig,
    parser: PacketParser,
    sessions: SessionTracker,
    rules: Arc<dyn RuleStore>,
    stats: StatCounters,
}

impl PacketAnalyzer {
    /// Create analyzer with the system clock, an empty rule store and the
    /// configured environment-trust probe
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;

        let trust: Arc<dyn EnvironmentTrust> = if config.integrity.enabled {
            Arc::new(ExecutableOriginTrust::new(
                config.integrity.expected_module.as_str(),
            ))
        } else {
            Arc::new(FixedTrust(true))
        };

        Ok(Self {
            parser: PacketParser::new(trust),
            sessions: SessionTracker::new(config.session.clone(), Arc::new(SystemClock)),
            rules: Arc::new(InMemoryRuleStore::new()),
            stats: StatCounters::default(),
            config,
        })
    }

    /// Replace the clock; drops tracked sessions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.sessions = SessionTracker::new(self.config.session.clone(), clock);
        self
    }

    pub fn with_trust(mut self, trust: Arc<dyn EnvironmentTrust>) -> Self {
        self.parser = PacketParser::new(trust);
        self
    }

    pub fn with_rules(mut self, rules: Arc<dyn RuleStore>) -> Self {
        self.rules = rules;
        self
    }

    /// Analyze one captured packet. Never fails: malformed input yields a
    /// tampered, High-risk result.
    pub fn analyze(&self, bytes: &[u8], identity: Option<&str>) -> AnalysisResult {
        let context = self.parser.parse(bytes);
        if let Some(violation) = &context.violation {
            tracing::warn!(%violation, bytes = context.length, "Packet integrity violation");
        }

        let key = FlowKey::from_context(&context);
        let session = self.sessions.register(&key, &context);
        let verdict = risk::evaluate(&context, &session);

        if verdict.tls_downgraded {
            tracing::debug!(flow = %key, score = verdict.risk_score, "TLS-high downgrade applied");
        }

        let identity = identity.filter(|id| !id.is_empty());
        let firewall_blocked = identity.is_some_and(|id| !self.rules.is_allowed(id));
        if let Some(id) = identity.filter(|_| firewall_blocked) {
            tracing::info!(identity = id, flow = %key, "Rule store blocked packet");
        }

        let blocked = firewall_blocked || verdict.label == RiskLabel::High;

        tracing::trace!(
            flow = %key,
            label = %verdict.label,
            score = verdict.risk_score,
            blocked,
            "Packet analyzed"
        );

        let result = AnalysisResult {
            context,
            session,
            verdict,
            identity: identity.map(str::to_string),
            firewall_blocked,
            blocked,
        };
        self.stats.record(&result);
        result
    }

    /// Analyze packets in slice order
    pub fn analyze_batch(&self, packets: &[(Vec<u8>, Option<String>)]) -> Vec<AnalysisResult> {
        packets
            .iter()
            .map(|(bytes, identity)| self.analyze(bytes, identity.as_deref()))
            .collect()
    }

    /// Flows currently held by the session tracker
    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn rules(&self) -> &Arc<dyn RuleStore> {
        &self.rules
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn stats(&self) -> AnalyzerStats {
        self.stats.snapshot()
    }
}
