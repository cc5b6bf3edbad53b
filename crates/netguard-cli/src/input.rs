//! Replay input parsing

use anyhow::{Context, Result};

/// One packet from a replay file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketLine {
    pub identity: Option<String>,
    pub bytes: Vec<u8>,
}

/// Parse `hex` or `identity,hex`. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<PacketLine>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (identity, hex) = match line.split_once(',') {
        Some((identity, hex)) => {
            let identity = identity.trim();
            ((!identity.is_empty()).then(|| identity.to_string()), hex)
        }
        None => (None, line),
    };

    Ok(Some(PacketLine {
        identity,
        bytes: decode_hex(hex)?,
    }))
}

/// Decode hex, tolerating a `0x` prefix and embedded whitespace
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    hex::decode(&compact).with_context(|| format!("invalid hex packet ({} chars)", compact.len()))
}
