//! Output formatting

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// One compact JSON record per line
    Json,
    /// Indented JSON
    Pretty,
}

impl OutputFormat {
    pub fn print<T: Serialize>(&self, data: &T) -> Result<()> {
        let text = match self {
            OutputFormat::Json => serde_json::to_string(data)?,
            OutputFormat::Pretty => serde_json::to_string_pretty(data)?,
        };
        println!("{}", text);
        Ok(())
    }
}
