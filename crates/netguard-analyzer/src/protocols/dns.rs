//! DNS Question Inspector
//!
//! Decodes the first question of a DNS message carried over UDP. Name
//! compression is not followed: a pointer label aborts the walk and the
//! message contributes no DNS evidence.

use super::be16;
use serde::Serialize;

/// DNS fixed header size
pub const DNS_HEADER_LEN: usize = 12;

/// RFC 1035 limit on a presentation-format name
pub const MAX_QNAME_LEN: usize = 253;

/// Query type ANY
pub const QTYPE_ANY: u16 = 255;

/// Query type OPT (EDNS pseudo-record)
pub const QTYPE_OPT: u16 = 41;

/// Decoded DNS question
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DnsRecord {
    /// Question decoded cleanly
    pub ok: bool,

    /// Sanitized, dot-joined query name
    pub qname: String,

    /// Query type (A, AAAA, MX, ...)
    pub qtype: u16,

    /// Response code nibble from the flags field
    pub rcode: u8,
}

impl DnsRecord {
    /// Number of `-` characters in the query name
    pub fn hyphen_count(&self) -> usize {
        self.qname.bytes().filter(|&b| b == b'-').count()
    }

    /// Name contains an SRV-style `_tcp` service label
    pub fn has_service_label(&self) -> bool {
        self.qname.contains("_tcp")
    }
}

/// Decode the question section of a DNS payload.
///
/// Returns a record with `ok == false` for anything short, compressed or
/// unterminated.
pub fn parse_query(data: &[u8]) -> DnsRecord {
    parse_question(data).unwrap_or_default()
}

fn parse_question(data: &[u8]) -> Option<DnsRecord> {
    if data.len() < DNS_HEADER_LEN {
        return None;
    }

    let flags = be16(data, 2);
    let qdcount = be16(data, 4);
    if qdcount == 0 {
        return None;
    }

    let mut pos = DNS_HEADER_LEN;
    let mut qname = String::new();
    let mut labels = 0usize;

    loop {
        let len = *data.get(pos)?;
        pos += 1;

        if len == 0 {
            break;
        }

        // Compression pointer or reserved label type
        if len & 0xC0 != 0 {
            return None;
        }

        let label = data.get(pos..pos + len as usize)?;
        if labels > 0 && qname.len() < MAX_QNAME_LEN {
            qname.push('.');
        }
        for &byte in label {
            if qname.len() >= MAX_QNAME_LEN {
                break;
            }
            qname.push(sanitize(byte));
        }

        labels += 1;
        pos += len as usize;
    }

    // qtype + qclass
    if pos + 4 > data.len() {
        return None;
    }

    Some(DnsRecord {
        ok: true,
        qname,
        qtype: be16(data, pos),
        rcode: (flags & 0x000F) as u8,
    })
}

/// Map a label byte onto the printable domain charset
#[inline]
fn sanitize(byte: u8) -> char {
    match byte {
        b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' => byte as char,
        _ => '_',
    }
}
