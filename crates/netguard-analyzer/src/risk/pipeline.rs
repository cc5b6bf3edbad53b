//! Score pipeline
//!
//! ```text
//! assess -> consolidate -> calibrate -> label -> TLS downgrade -> final guard
//!                                                                  |
//!                                                             confidence
//! ```
//!
//! Every stage after `consolidate` keeps `raw <= calibrated <= 1`.

use super::{
    assess, RiskAssessment, RiskLabel, ABSOLUTE_HIGH_SCORE, HIGH_RISK_THRESHOLD,
};
use crate::parser::PacketContext;
use crate::session::SessionSnapshot;

// Calibration
const MATURITY_MIN_SCORE: f64 = 0.6;
const MATURITY_MIN_PACKETS: u64 = 8;
const MATURITY_MIN_SECS: f64 = 1.0;
const MATURITY_PER_PACKET: f64 = 0.002;
const MATURITY_CAP: f64 = 0.06;
const MATURITY_CAP_LONG_LIVED: f64 = 0.08;
const LONG_LIVED_SECS: f64 = 6.0;

const REGULAR_TIMING_MIN_SCORE: f64 = 0.7;
const REGULAR_TIMING_MIN_SAMPLES: u64 = 8;
const REGULAR_TIMING_MAX_STDDEV_MS: f64 = 12.0;
const REGULAR_TIMING_BONUS: f64 = 0.02;

const VOLUME_MIN_SCORE: f64 = 0.65;
const VOLUME_MIN_BYTES: u64 = 8 * 1024 * 1024;
const VOLUME_BONUS: f64 = 0.02;

// TLS-high downgrade
const DOWNGRADE_MIN_SECS: f64 = 3.5;
const DOWNGRADE_MIN_PACKETS: u64 = 15;
const DOWNGRADE_MIN_BIDIRECTIONAL_SHARE: f64 = 0.35;
const DOWNGRADE_MAX_SMALL_RATIO: f64 = 0.94;
const DOWNGRADE_MIN_BYTES: u64 = 64 * 1024;

/// Score a downgraded flow is clamped to
pub const DOWNGRADE_CEILING: f64 = HIGH_RISK_THRESHOLD - 0.001;

// Confidence
const CONFIDENCE_BASE: f64 = 0.35;
const CONFIDENCE_PER_SCORE: f64 = 0.4;
const CONFIDENCE_CONFIRMED: f64 = 0.18;

/// Final outcome for one packet
#[derive(Clone, Debug, PartialEq)]
pub struct RiskVerdict {
    /// Consolidated bucket maximum
    pub raw_score: f64,
    /// Calibrated score the label is derived from
    pub risk_score: f64,
    pub confidence: f64,
    pub label: RiskLabel,
    /// High was suppressed for an ordinary long-lived TLS stream
    pub tls_downgraded: bool,
    pub assessment: RiskAssessment,
}

/// Run the whole pipeline
pub fn evaluate(ctx: &PacketContext, session: &SessionSnapshot) -> RiskVerdict {
    let mut assessment = assess(ctx, session);

    let mut raw_score = consolidate(&assessment);
    let mut risk_score = calibrate(raw_score, session);
    let mut label = RiskLabel::from_score(risk_score, assessment.high_risk_confirmed);

    let tls_downgraded = label == RiskLabel::High && downgrade_applies(ctx, session, &assessment);
    if tls_downgraded {
        label = RiskLabel::Medium;
        risk_score = risk_score.min(DOWNGRADE_CEILING);
        raw_score = raw_score.min(DOWNGRADE_CEILING);
    }

    let (label, risk_score) = final_guard(label, risk_score, &mut assessment);
    let confidence = confidence(risk_score, &assessment, session);

    RiskVerdict {
        raw_score,
        risk_score,
        confidence,
        label,
        tls_downgraded,
        assessment,
    }
}

/// Highest bucket, clamped to [0, 1] and floored by confirmation
pub fn consolidate(risk: &RiskAssessment) -> f64 {
    let score = risk.max_score().clamp(0.0, 1.0);
    if risk.high_risk_confirmed {
        score.max(ABSOLUTE_HIGH_SCORE)
    } else {
        score
    }
}

/// Add history-based bonuses; never decreases `raw`
pub fn calibrate(raw: f64, session: &SessionSnapshot) -> f64 {
    let duration = session.duration_secs();
    let mut score = raw;

    if raw >= MATURITY_MIN_SCORE
        && session.packet_count >= MATURITY_MIN_PACKETS
        && duration >= MATURITY_MIN_SECS
    {
        let cap = if duration >= LONG_LIVED_SECS {
            MATURITY_CAP_LONG_LIVED
        } else {
            MATURITY_CAP
        };
        score += (session.packet_count as f64 * MATURITY_PER_PACKET).min(cap);
    }

    if raw >= REGULAR_TIMING_MIN_SCORE
        && session.inter_arrival_samples >= REGULAR_TIMING_MIN_SAMPLES
        && session.inter_arrival_stddev_ms < REGULAR_TIMING_MAX_STDDEV_MS
    {
        score += REGULAR_TIMING_BONUS;
    }

    if raw >= VOLUME_MIN_SCORE && session.total_bytes >= VOLUME_MIN_BYTES {
        score += VOLUME_BONUS;
    }

    score.min(1.0).max(raw)
}

/// High earned only through flow correlation (the dominant bucket) on a
/// recognisable, healthy TLS stream to an ordinary host name
pub fn downgrade_applies(
    ctx: &PacketContext,
    session: &SessionSnapshot,
    risk: &RiskAssessment,
) -> bool {
    if risk.high_risk_confirmed
        || risk.primary_score >= HIGH_RISK_THRESHOLD
        || risk.secondary_score >= HIGH_RISK_THRESHOLD
    {
        return false;
    }

    // High must come from flow correlation, not packet evidence lifted by calibration
    if risk.correlation_score < risk.primary_score.max(risk.secondary_score) {
        return false;
    }

    let tls_recognised = session.tls_handshake_seen || ctx.is_client_hello();
    let healthy_stream = session.duration_secs() >= DOWNGRADE_MIN_SECS
        && session.packet_count >= DOWNGRADE_MIN_PACKETS
        && session.bidirectional_share() > DOWNGRADE_MIN_BIDIRECTIONAL_SHARE
        && session.small_ratio() <= DOWNGRADE_MAX_SMALL_RATIO
        && session.total_bytes >= DOWNGRADE_MIN_BYTES;

    if !tls_recognised || !healthy_stream {
        return false;
    }

    ctx.clean_client_hello()
        .and_then(|hello| hello.server_name.as_deref())
        .or(session.last_sni.as_deref())
        .is_some_and(looks_like_hostname)
}

/// Syntactically ordinary DNS host name
pub fn looks_like_hostname(name: &str) -> bool {
    let len = name.chars().count();
    if len < 4 || !name.contains('.') || name.starts_with('.') || name.ends_with('.') {
        return false;
    }

    let alpha = name.chars().filter(|c| c.is_ascii_alphabetic()).count();
    let digits = name.chars().filter(|c| c.is_ascii_digit()).count();
    let other = len - alpha - digits;

    alpha * 2 > len && digits <= alpha * 2 && other <= alpha + digits
}

/// Confirmed evidence must end up High; repairing it flags a possible
/// false negative
pub fn final_guard(
    label: RiskLabel,
    score: f64,
    risk: &mut RiskAssessment,
) -> (RiskLabel, f64) {
    if risk.high_risk_confirmed && label != RiskLabel::High {
        risk.possible_false_negative = true;
        return (RiskLabel::High, score.max(ABSOLUTE_HIGH_SCORE));
    }
    (label, score)
}

/// How much the verdict should be trusted, in [0, 1]
pub fn confidence(score: f64, risk: &RiskAssessment, session: &SessionSnapshot) -> f64 {
    let duration = session.duration_secs();
    let mut confidence = CONFIDENCE_BASE + CONFIDENCE_PER_SCORE * score;

    if risk.high_risk_confirmed {
        confidence += CONFIDENCE_CONFIRMED;
    }

    if session.packet_count >= 50 {
        confidence += 0.05;
    } else if session.packet_count >= 12 {
        confidence += 0.02;
    }

    if session.inter_arrival_samples >= 8 && duration >= 2.0 {
        confidence += 0.04;
    }

    if session.packet_count < 3 || duration < 0.25 {
        confidence -= 0.05;
    }

    confidence.clamp(0.0, 1.0)
}
