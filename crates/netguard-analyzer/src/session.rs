//! Session Tracker
//!
//! Bounded, time-expiring map from flow key to running per-flow statistics.
//!
//! # Design
//!
//! - One `parking_lot::Mutex` guards the whole map; the critical section is
//!   prune + update + snapshot copy
//! - Eviction is lazy (checked on every registration) and coarse: idle flows
//!   are dropped, and a map that would grow past its cap is cleared outright
//! - Callers receive a [`SessionSnapshot`] by value and score it after the
//!   lock is released

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::parser::{Direction, PacketContext};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Flow identifier: `src->dst:dstPort`, or `unknown:dstPort` without addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey(String);

impl FlowKey {
    pub fn from_context(ctx: &PacketContext) -> Self {
        if ctx.src_ip.is_none() && ctx.dst_ip.is_none() {
            return Self(format!("unknown:{}", ctx.dst_port));
        }

        let src = ctx.src_ip.map(|ip| ip.to_string()).unwrap_or_default();
        let dst = ctx.dst_ip.map(|ip| ip.to_string()).unwrap_or_default();
        Self(format!("{}->{}:{}", src, dst, ctx.dst_port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Welford running mean / population variance
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0)
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Live per-flow state, owned by the tracker
#[derive(Debug, Clone)]
struct FlowState {
    first_seen: Instant,
    last_seen: Option<Instant>,
    packets: u64,
    small_payloads: u64,
    burst_packets: u64,
    burst_small_payloads: u64,
    total_bytes: u64,
    inbound: u64,
    outbound: u64,
    payload: RunningStats,
    inter_arrival_ms: RunningStats,
    tls_handshake_seen: bool,
    last_sni: Option<String>,
}

impl FlowState {
    fn new(now: Instant) -> Self {
        Self {
            first_seen: now,
            last_seen: None,
            packets: 0,
            small_payloads: 0,
            burst_packets: 0,
            burst_small_payloads: 0,
            total_bytes: 0,
            inbound: 0,
            outbound: 0,
            payload: RunningStats::default(),
            inter_arrival_ms: RunningStats::default(),
            tls_handshake_seen: false,
            last_sni: None,
        }
    }

    fn update(&mut self, ctx: &PacketContext, now: Instant, config: &SessionConfig) {
        let gap = self.last_seen.map(|prev| now.saturating_duration_since(prev));

        if matches!(gap, Some(g) if g >= config.burst_gap()) {
            self.burst_packets = 0;
            self.burst_small_payloads = 0;
        }

        self.packets += 1;
        self.burst_packets += 1;

        if ctx.payload_length <= config.small_payload_bytes {
            self.small_payloads += 1;
            self.burst_small_payloads += 1;
        }

        self.total_bytes += ctx.length as u64;

        match ctx.direction {
            Direction::Inbound => self.inbound += 1,
            Direction::Outbound => self.outbound += 1,
            Direction::Lan => {}
        }

        self.payload.push(ctx.payload_length as f64);
        if let Some(gap) = gap {
            self.inter_arrival_ms.push(gap.as_secs_f64() * 1000.0);
        }

        self.last_seen = Some(now);

        if ctx.is_tls_flow() {
            if let Some(hello) = ctx.tls.as_ref().filter(|t| t.parsed && !t.malformed) {
                self.tls_handshake_seen = true;
                if let Some(sni) = &hello.server_name {
                    self.last_sni = Some(sni.clone());
                }
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            packet_count: self.packets,
            small_payload_count: self.small_payloads,
            burst_packet_count: self.burst_packets,
            burst_small_payload_count: self.burst_small_payloads,
            total_bytes: self.total_bytes,
            inbound_packets: self.inbound,
            outbound_packets: self.outbound,
            payload_mean: self.payload.mean(),
            payload_stddev: self.payload.stddev(),
            inter_arrival_mean_ms: self.inter_arrival_ms.mean(),
            inter_arrival_stddev_ms: self.inter_arrival_ms.stddev(),
            inter_arrival_samples: self.inter_arrival_ms.count(),
            first_seen: self.first_seen,
            last_seen: self.last_seen.unwrap_or(self.first_seen),
            tls_handshake_seen: self.tls_handshake_seen,
            last_sni: self.last_sni.clone(),
        }
    }
}

/// Immutable copy of a flow's aggregate state at registration time
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub packet_count: u64,
    pub small_payload_count: u64,
    pub burst_packet_count: u64,
    pub burst_small_payload_count: u64,
    pub total_bytes: u64,
    pub inbound_packets: u64,
    pub outbound_packets: u64,
    pub payload_mean: f64,
    pub payload_stddev: f64,
    pub inter_arrival_mean_ms: f64,
    pub inter_arrival_stddev_ms: f64,
    pub inter_arrival_samples: u64,
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub tls_handshake_seen: bool,
    pub last_sni: Option<String>,
}

impl SessionSnapshot {
    /// Snapshot of a flow that has seen no packets
    pub fn empty(now: Instant) -> Self {
        FlowState::new(now).snapshot()
    }

    pub fn small_ratio(&self) -> f64 {
        ratio(self.small_payload_count, self.packet_count)
    }

    pub fn burst_small_ratio(&self) -> f64 {
        ratio(self.burst_small_payload_count, self.burst_packet_count)
    }

    /// min(inbound, outbound) / packets
    pub fn bidirectional_share(&self) -> f64 {
        ratio(
            self.inbound_packets.min(self.outbound_packets),
            self.packet_count,
        )
    }

    pub fn duration_secs(&self) -> f64 {
        self.last_seen
            .saturating_duration_since(self.first_seen)
            .as_secs_f64()
    }
}

#[inline]
fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Session tracker
pub struct SessionTracker {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    flows: Mutex<HashMap<FlowKey, FlowState>>,
}

impl SessionTracker {
    /// Create new tracker
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            flows: Mutex::new(HashMap::new()),
        }
    }

    /// Fold one packet into its flow and return the updated state
    pub fn register(&self, key: &FlowKey, ctx: &PacketContext) -> SessionSnapshot {
        let now = self.clock.now();
        let mut flows = self.flows.lock();

        self.prune_locked(&mut flows, now, key);

        let state = flows
            .entry(key.clone())
            .or_insert_with(|| FlowState::new(now));
        state.update(ctx, now, &self.config);
        state.snapshot()
    }

    /// Number of tracked flows
    pub fn len(&self) -> usize {
        self.flows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all flows
    pub fn clear(&self) {
        self.flows.lock().clear();
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn prune_locked(&self, flows: &mut HashMap<FlowKey, FlowState>, now: Instant, incoming: &FlowKey) {
        let expiration = self.config.expiration();
        flows.retain(|_, flow| {
            let last = flow.last_seen.unwrap_or(flow.first_seen);
            now.saturating_duration_since(last) <= expiration
        });

        // A full map also clears when the incoming key is new, so inserting it
        // never takes the map past the cap
        let cap = self.config.max_tracked_sessions;
        if flows.len() > cap || (flows.len() == cap && !flows.contains_key(incoming)) {
            tracing::debug!(evicted = flows.len(), cap, "Session map full, clearing");
            flows.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::integrity::FixedTrust;
    use crate::parser::PacketParser;
    use crate::testutil::*;
    use proptest::prelude::*;

    fn setup(config: SessionConfig) -> (SessionTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (SessionTracker::new(config, clock.clone()), clock)
    }

    fn ctx(packet: &[u8]) -> PacketContext {
        PacketParser::new(Arc::new(FixedTrust(true))).parse(packet)
    }

    fn payload_ctx(len: usize) -> PacketContext {
        ctx(&ipv4_tcp(DEVICE, REMOTE, 50000, 8080, &vec![0u8; len]))
    }

    #[test]
    fn test_flow_key_format() {
        let c = ctx(&ipv4_tcp(DEVICE, REMOTE, 50000, 443, b""));
        assert_eq!(FlowKey::from_context(&c).as_str(), "10.0.0.2->93.184.216.34:443");

        let empty = ctx(&[]);
        assert_eq!(FlowKey::from_context(&empty).as_str(), "unknown:0");
    }

    #[test]
    fn test_counters_and_burst() {
        let (tracker, clock) = setup(SessionConfig::default());
        let small = payload_ctx(10);
        let large = payload_ctx(1000);
        let key = FlowKey::from_context(&small);

        tracker.register(&key, &small);
        clock.advance_ms(100);
        tracker.register(&key, &large);
        clock.advance_ms(100);
        let snap = tracker.register(&key, &small);

        assert_eq!(snap.packet_count, 3);
        assert_eq!(snap.small_payload_count, 2);
        assert_eq!(snap.burst_packet_count, 3);
        assert_eq!(snap.burst_small_payload_count, 2);
        assert_eq!(snap.outbound_packets, 3);
        assert_eq!(snap.inbound_packets, 0);
        assert_eq!(snap.total_bytes, (small.length * 2 + large.length) as u64);
        assert_eq!(snap.inter_arrival_samples, 2);
        assert!((snap.inter_arrival_mean_ms - 100.0).abs() < 1e-6);
        assert!(snap.inter_arrival_stddev_ms.abs() < 1e-6);
        assert!((snap.duration_secs() - 0.2).abs() < 1e-9);

        // Gap ends the burst, lifetime counters keep going
        clock.advance_ms(600);
        let snap = tracker.register(&key, &large);
        assert_eq!(snap.packet_count, 4);
        assert_eq!(snap.burst_packet_count, 1);
        assert_eq!(snap.burst_small_payload_count, 0);
        assert_eq!(snap.small_payload_count, 2);
    }

    #[test]
    fn test_lan_counts_in_neither_direction() {
        let (tracker, _) = setup(SessionConfig::default());
        let lan = ctx(&ipv4_tcp([192, 168, 0, 2], [192, 168, 0, 3], 1000, 2000, b""));
        let snap = tracker.register(&FlowKey::from_context(&lan), &lan);

        assert_eq!(snap.packet_count, 1);
        assert_eq!(snap.inbound_packets + snap.outbound_packets, 0);
        assert_eq!(snap.inter_arrival_samples, 0);
    }

    #[test]
    fn test_tls_handshake_and_sni() {
        let (tracker, clock) = setup(SessionConfig::default());
        let hello = ctx(&ipv4_tcp(DEVICE, REMOTE, 50000, 443, &client_hello(Some("cdn.example.net"), 12)));
        let data = ctx(&ipv4_tcp(DEVICE, REMOTE, 50000, 443, &[0x17; 300]));
        let key = FlowKey::from_context(&hello);

        let snap = tracker.register(&key, &data);
        assert!(!snap.tls_handshake_seen);

        clock.advance_ms(10);
        tracker.register(&key, &hello);
        clock.advance_ms(10);
        let snap = tracker.register(&key, &data);

        assert!(snap.tls_handshake_seen);
        assert_eq!(snap.last_sni.as_deref(), Some("cdn.example.net"));
    }

    #[test]
    fn test_malformed_hello_not_recorded() {
        let (tracker, _) = setup(SessionConfig::default());
        let record = client_hello(Some("example.com"), 8);
        let broken = ctx(&ipv4_tcp(DEVICE, REMOTE, 50000, 443, &record[..60]));
        let snap = tracker.register(&FlowKey::from_context(&broken), &broken);

        assert!(!snap.tls_handshake_seen);
        assert_eq!(snap.last_sni, None);
    }

    #[test]
    fn test_expired_flows_pruned() {
        let (tracker, clock) = setup(SessionConfig::default());
        let c = payload_ctx(10);
        let key = FlowKey::from_context(&c);

        tracker.register(&key, &c);
        tracker.register(&key, &c);
        clock.advance_ms(10_001);

        let snap = tracker.register(&key, &c);
        assert_eq!(snap.packet_count, 1);
        assert_eq!(snap.inter_arrival_samples, 0);
    }

    #[test]
    fn test_overflow_clears_and_drops_expired_stats() {
        let config = SessionConfig {
            max_tracked_sessions: 4,
            ..Default::default()
        };
        let (tracker, clock) = setup(config);

        let stale = FlowKey("stale".into());
        for _ in 0..5 {
            tracker.register(&stale, &payload_ctx(10));
        }
        clock.advance_ms(11_000);

        for i in 0..4 {
            tracker.register(&FlowKey(format!("flow-{}", i)), &payload_ctx(10));
        }
        assert_eq!(tracker.len(), 4);

        // Map at capacity, new key: cleared before insert
        let snap = tracker.register(&FlowKey("new".into()), &payload_ctx(10));
        assert_eq!(snap.packet_count, 1);
        assert_eq!(tracker.len(), 1);

        let snap = tracker.register(&stale, &payload_ctx(10));
        assert_eq!(snap.packet_count, 1);
        assert!(tracker.len() <= 4);
    }

    #[test]
    fn test_existing_key_at_capacity_is_kept() {
        let config = SessionConfig {
            max_tracked_sessions: 2,
            ..Default::default()
        };
        let (tracker, _) = setup(config);
        let a = FlowKey("a".into());
        tracker.register(&a, &payload_ctx(1));
        tracker.register(&FlowKey("b".into()), &payload_ctx(1));

        let snap = tracker.register(&a, &payload_ctx(1));
        assert_eq!(snap.packet_count, 2);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let (tracker, _) = setup(SessionConfig::default());
        let c = payload_ctx(10);
        let key = FlowKey::from_context(&c);

        let first = tracker.register(&key, &c);
        let second = tracker.register(&key, &c);
        assert_eq!(first.packet_count, 1);
        assert_eq!(second.packet_count, 2);
    }

    #[test]
    fn test_concurrent_registration() {
        let (tracker, _) = setup(SessionConfig::default());
        let tracker = Arc::new(tracker);
        let c = Arc::new(payload_ctx(10));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                let c = c.clone();
                std::thread::spawn(move || {
                    let key = FlowKey(format!("thread-{}", t % 2));
                    for _ in 0..100 {
                        tracker.register(&key, &c);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = tracker.register(&FlowKey("thread-0".into()), &c);
        assert_eq!(snap.packet_count, 401);
    }

    proptest! {
        #[test]
        fn prop_welford_matches_two_pass(sizes in proptest::collection::vec(0usize..1500, 1..200)) {
            let (tracker, clock) = setup(SessionConfig::default());
            let key = FlowKey("prop".into());
            let mut snap = None;
            for &size in &sizes {
                clock.advance_ms(5);
                snap = Some(tracker.register(&key, &payload_ctx(size)));
            }
            let snap = snap.unwrap();

            let n = sizes.len() as f64;
            let mean = sizes.iter().map(|&s| s as f64).sum::<f64>() / n;
            let var = sizes.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;

            prop_assert!((snap.payload_mean - mean).abs() < 1e-6);
            prop_assert!((snap.payload_stddev - var.sqrt()).abs() < 1e-6);
        }
    }
}
