//! Analyzer Benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use netguard_analyzer::parser::shannon_entropy;
use netguard_analyzer::{AnalyzerConfig, FixedTrust, ManualClock, PacketAnalyzer, PacketParser};
use std::sync::Arc;

// IPv4 (20 bytes) + TCP (20 bytes), 10.0.0.2:50000 -> 93.184.216.34:443
const IPV4_TCP: [u8; 40] = [
    0x45, 0x00, 0x00, 0x28, // ver, ihl, tos, len
    0x00, 0x00, 0x40, 0x00, // id, flags, frag
    0x40, 0x06, 0x00, 0x00, // ttl, proto (TCP), checksum
    0x0A, 0x00, 0x00, 0x02, // src ip
    0x5D, 0xB8, 0xD8, 0x22, // dst ip
    0xC3, 0x50, 0x01, 0xBB, // src port 50000, dst port 443
    0x00, 0x00, 0x00, 0x01, // seq
    0x00, 0x00, 0x00, 0x00, // ack
    0x50, 0x18, 0xFF, 0xFF, // offset, flags, window
    0x00, 0x00, 0x00, 0x00, // checksum, urgent
];

fn with_payload(header: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut packet = header.to_vec();
    packet.extend_from_slice(payload);
    let total = (packet.len() as u16).to_be_bytes();
    packet[2] = total[0];
    packet[3] = total[1];
    packet
}

fn dns_packet() -> Vec<u8> {
    let mut udp = vec![
        0xD0, 0x00, 0x00, 0x35, // src port 53248, dst port 53
        0x00, 0x00, 0x00, 0x00, // len, checksum
        0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    for label in ["www", "example", "com"] {
        udp.push(label.len() as u8);
        udp.extend_from_slice(label.as_bytes());
    }
    udp.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x01]);

    let mut header = IPV4_TCP[..20].to_vec();
    header[9] = 17;
    header[16..20].copy_from_slice(&[8, 8, 8, 8]);
    with_payload(&header, &udp)
}

fn client_hello_packet(sni: &str) -> Vec<u8> {
    let name = sni.as_bytes();
    let mut body = vec![0x03, 0x03];
    body.extend_from_slice(&[0x11; 32]);
    body.push(0);
    body.extend_from_slice(&[0x00, 0x08, 0x13, 0x01, 0x13, 0x02, 0xC0, 0x2F, 0xC0, 0x30]);
    body.extend_from_slice(&[0x01, 0x00]);

    let ext_len = (name.len() + 9) as u16;
    body.extend_from_slice(&ext_len.to_be_bytes());
    body.extend_from_slice(&[0x00, 0x00]);
    body.extend_from_slice(&((name.len() + 5) as u16).to_be_bytes());
    body.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
    body.push(0x00);
    body.extend_from_slice(&(name.len() as u16).to_be_bytes());
    body.extend_from_slice(name);

    let mut record = vec![0x16, 0x03, 0x01];
    record.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
    record.push(0x01);
    record.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    record.extend_from_slice(&body);

    with_payload(&IPV4_TCP, &record)
}

fn analyzer() -> (PacketAnalyzer, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let analyzer = PacketAnalyzer::new(AnalyzerConfig::default())
        .expect("default config")
        .with_clock(clock.clone())
        .with_trust(Arc::new(FixedTrust(true)));
    (analyzer, clock)
}

fn bench_parse(c: &mut Criterion) {
    let parser = PacketParser::new(Arc::new(FixedTrust(true)));
    let hello = client_hello_packet("www.example.com");
    let dns = dns_packet();

    c.bench_function("parse_ipv4_tcp", |b| {
        b.iter(|| black_box(parser.parse(black_box(&IPV4_TCP))))
    });

    c.bench_function("parse_client_hello", |b| {
        b.iter(|| black_box(parser.parse(black_box(&hello))))
    });

    c.bench_function("parse_dns_query", |b| {
        b.iter(|| black_box(parser.parse(black_box(&dns))))
    });
}

fn bench_entropy(c: &mut Criterion) {
    let data: Vec<u8> = (0..512u32).map(|i| (i * 31 % 251) as u8).collect();

    c.bench_function("shannon_entropy_512", |b| {
        b.iter(|| black_box(shannon_entropy(black_box(&data))))
    });
}

fn bench_analyze(c: &mut Criterion) {
    let (analyzer, clock) = analyzer();
    let hello = client_hello_packet("api.example.com");

    c.bench_function("analyze_single_flow", |b| {
        b.iter(|| {
            clock.advance_ms(5);
            black_box(analyzer.analyze(black_box(&hello), Some("com.example.app")))
        })
    });
}

fn bench_analyze_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze_throughput");

    let packets: Vec<Vec<u8>> = (0..64u8)
        .map(|i| {
            let mut p = with_payload(&IPV4_TCP, &[0xAB; 256]);
            p[19] = i;
            p
        })
        .collect();
    let bytes: usize = packets.iter().map(Vec::len).sum();
    group.throughput(Throughput::Bytes(bytes as u64));

    group.bench_function("64_flows", |b| {
        let (analyzer, clock) = analyzer();
        b.iter(|| {
            clock.advance_ms(1);
            for packet in &packets {
                black_box(analyzer.analyze(packet, None));
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_entropy,
    bench_analyze,
    bench_analyze_throughput,
);

criterion_main!(benches);
