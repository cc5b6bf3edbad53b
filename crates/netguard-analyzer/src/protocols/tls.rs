//! TLS ClientHello Inspector
//!
//! Walks a TLS handshake record far enough to recover the offered version,
//! the cipher-suite count and the SNI host name. Structural violations inside
//! a ClientHello mark it malformed; fields read before the violation stay.

use super::be16;
use serde::Serialize;

/// Well-known TLS ports
pub const TLS_PORTS: [u16; 3] = [443, 8443, 9443];

/// Record header (5) + handshake type (1)
pub const MIN_RECORD_PREFIX: usize = 6;

/// TLS 1.2 wire version
pub const TLS_1_2: u16 = 0x0303;

const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const EXT_SERVER_NAME: u16 = 0x0000;
const SNI_HOST_NAME: u8 = 0x00;
const RANDOM_LEN: usize = 32;

/// TLS handshake indicators
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TlsIndicators {
    /// Record was a handshake record
    pub parsed: bool,

    /// Handshake message is a ClientHello
    pub client_hello: bool,

    /// ClientHello violated its own length fields
    pub malformed: bool,

    /// Offered (ClientHello) or record-layer version
    pub version: u16,

    /// Offered cipher suites
    pub cipher_count: usize,

    /// Server Name Indication
    pub server_name: Option<String>,
}

impl TlsIndicators {
    /// Parsed, ClientHello and well-formed
    pub fn is_clean_client_hello(&self) -> bool {
        self.parsed && self.client_hello && !self.malformed
    }
}

/// Check if a port is a well-known TLS port
#[inline]
pub fn is_tls_port(port: u16) -> bool {
    TLS_PORTS.contains(&port)
}

/// Inspect the first record of a TCP payload
pub fn inspect(payload: &[u8]) -> TlsIndicators {
    let mut tls = TlsIndicators::default();

    if payload.len() < MIN_RECORD_PREFIX || payload[0] != CONTENT_TYPE_HANDSHAKE {
        return tls;
    }
    tls.parsed = true;

    // ServerHello, Certificate, ... are not our concern
    if payload[5] != HANDSHAKE_CLIENT_HELLO {
        tls.version = be16(payload, 1);
        return tls;
    }

    tls.client_hello = true;
    if parse_client_hello(payload, &mut tls).is_none() {
        tls.malformed = true;
    }
    tls
}

/// Returns `None` on the first structural violation
fn parse_client_hello(payload: &[u8], tls: &mut TlsIndicators) -> Option<()> {
    let mut reader = Reader::new(payload, MIN_RECORD_PREFIX);

    let declared_len = reader.u24()? as usize;
    let body_start = reader.pos;

    tls.version = reader.u16()?;
    reader.skip(RANDOM_LEN)?;

    let session_id_len = reader.u8()? as usize;
    reader.skip(session_id_len)?;

    let cipher_len = reader.u16()? as usize;
    if cipher_len % 2 != 0 {
        return None;
    }
    reader.skip(cipher_len)?;
    tls.cipher_count = cipher_len / 2;

    let compression_len = reader.u8()? as usize;
    reader.skip(compression_len)?;

    // Pre-extension ClientHellos end here
    if reader.remaining() > 0 {
        let ext_len = reader.u16()? as usize;
        let ext_start = reader.pos;
        let block_end = (ext_start + ext_len).min(payload.len());

        while reader.pos + 4 <= block_end {
            let ext_type = reader.u16()?;
            let len = reader.u16()? as usize;
            if reader.pos + len > block_end {
                return None;
            }
            let data = reader.take(len)?;

            if ext_type == EXT_SERVER_NAME && len >= 5 && tls.server_name.is_none() {
                tls.server_name = parse_server_name(data);
            }
        }

        if reader.pos - ext_start != ext_len {
            return None;
        }
    }

    if reader.pos - body_start != declared_len {
        return None;
    }

    Some(())
}

/// First `host_name` entry of a server_name list
fn parse_server_name(data: &[u8]) -> Option<String> {
    let list_len = be16(data, 0) as usize;
    let end = (2 + list_len).min(data.len());
    let mut reader = Reader::new(&data[..end], 2);

    while reader.remaining() >= 3 {
        let name_type = reader.u8()?;
        let name_len = reader.u16()? as usize;
        let name = reader.take(name_len)?;
        if name_type == SNI_HOST_NAME {
            return Some(String::from_utf8_lossy(name).into_owned());
        }
    }
    None
}

/// Bounds-checked big-endian cursor
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let data = self.data;
        let slice = data.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(slice)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| be16(b, 0))
    }

    fn u24(&mut self) -> Option<u32> {
        self.take(3)
            .map(|b| ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32))
    }
}
