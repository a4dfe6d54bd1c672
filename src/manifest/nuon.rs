//! Reading NUON (nushell object notation) files.
//!
//! NUON is a superset of JSON. Files that happen to be valid JSON are parsed
//! directly; anything else is converted by the `nu` binary
//! (`$in | from nuon | to json`).
//!
//! Conversion is blocking: registry lookups happen during resolution, which runs
//! before any concurrent work is started. Async callers go through
//! `tokio::task::spawn_blocking`.

use crate::utils::platform::command_exists;
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Reads and parses a NUON file.
pub fn load_nuon_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_nuon(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parses NUON text.
pub fn parse_nuon(content: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        return Ok(value);
    }
    tracing::trace!(target: "manifest", "content is not JSON, converting with nu");
    convert_with_nu(content)
}

fn convert_with_nu(content: &str) -> Result<Value> {
    if !command_exists("nu") {
        anyhow::bail!("Content is not JSON and converting NUON needs nushell (`nu`) in PATH");
    }
    let mut child = Command::new("nu")
        .args(["--no-config-file", "--stdin", "--commands", "$in | from nuon | to json"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to run nu to convert NUON (is nushell installed and in PATH?)")?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(content.as_bytes()).context("Failed to write NUON to nu")?;
    }

    let output = child.wait_with_output().context("Failed to wait for nu")?;
    if !output.status.success() {
        anyhow::bail!(
            "nu could not convert NUON to JSON: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    serde_json::from_slice(&output.stdout).context("nu returned invalid JSON")
}
