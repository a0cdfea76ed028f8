//! Kernel-exposed attribute helpers
//!
//! Thin async readers over `/sys` and `/proc` files. A missing attribute is
//! reported as `Ok(None)` so callers can tell "not present" from "broken".

use linecheck_core::{LineCheckError, Result};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Read an attribute file, trimmed. `None` when the file does not exist.
pub async fn read_attr(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LineCheckError::Hardware(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Read an attribute holding a single integer
pub async fn read_number(path: &Path) -> Result<Option<i64>> {
    match read_attr(path).await? {
        Some(value) => value.parse::<i64>().map(Some).map_err(|_| {
            LineCheckError::Parse(format!("{}: not a number: '{}'", path.display(), value))
        }),
        None => Ok(None),
    }
}

/// Total memory in MiB from `/proc/meminfo` content
pub fn parse_meminfo_total_mb(content: &str) -> Result<u64> {
    let line = content
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .ok_or_else(|| LineCheckError::Parse("MemTotal not found".to_string()))?;
    let kb = line
        .split_whitespace()
        .nth(1)
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| LineCheckError::Parse(format!("Malformed meminfo line: '{}'", line)))?;
    Ok(kb / 1024)
}

/// Framebuffer `virtual_size` content (`"1920,1080"`) as `(width, height)`
pub fn parse_virtual_size(content: &str) -> Result<(u32, u32)> {
    let (w, h) = content
        .trim()
        .split_once(',')
        .ok_or_else(|| LineCheckError::Parse(format!("Malformed virtual_size: '{}'", content)))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|_| LineCheckError::Parse(format!("Malformed virtual_size: '{}'", content)))
    };
    Ok((parse(w)?, parse(h)?))
}

/// Find the MAC embedded in a burned identifier: the 12 characters starting at
/// the vendor prefix `oui`.
pub fn extract_mac(identifier: &str, oui: &str) -> Option<String> {
    let start = identifier.find(oui)?;
    let mac: String = identifier[start..].chars().take(12).collect();
    (mac.len() == 12 && mac.chars().all(|c| c.is_ascii_hexdigit())).then_some(mac)
}

/// Render a 12-hex-digit MAC as `aa:bb:cc:dd:ee:ff`
pub fn format_mac(mac: &str) -> String {
    mac.as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}
