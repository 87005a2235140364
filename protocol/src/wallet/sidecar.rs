//! # Sidecar Persistence
//!
//! The `.bip47` sidecar holds the channel map as a JSON array, pretty
//! printed, one object per channel in the schema the [`Channel`] type
//! serializes to. It is rewritten after every mutating wallet call.
//!
//! Writes go to a temporary file in the same directory followed by a
//! rename, so a crash mid-write leaves the previous sidecar intact
//! rather than a half-written one.

use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::channel::Channel;

/// Errors from sidecar I/O.
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("sidecar io: {0}")]
    Io(#[from] std::io::Error),

    #[error("sidecar json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads the channel list from a sidecar file.
///
/// A missing file is an empty channel map, not an error; the file
/// appears with the first write.
pub fn load(path: &Path) -> Result<Vec<Channel>, SidecarError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let channels = serde_json::from_str(&raw)?;
    Ok(channels)
}

/// Atomically rewrites the sidecar with the given channels.
pub fn store(path: &Path, channels: &[&Channel]) -> Result<(), SidecarError> {
    let json = serde_json::to_string_pretty(channels)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    fs::write(tmp, json)?;
    fs::rename(tmp, path)?;
    debug!(path = %path.display(), channels = channels.len(), "sidecar saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOB_CODE: &str =
        "PM8TJS2JxQ5ztXUpBBRnpTbcUXbUHy2T1abfrb3KkAAtMEGNbey4oumH7Hc578WgQJhPjBxteQ5GHHToTYHE3A1w6p7tU6KSoFmWBVbFGjKPisZDbP97";

    #[test]
    fn missing_file_is_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let channels = load(&dir.path().join("BTC.bip47")).unwrap();
        assert!(channels.is_empty());
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTC.bip47");

        let mut channel = Channel::with_label(BOB_CODE, "Bob");
        channel.set_status_sent();
        store(&path, &[&channel]).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, vec![channel]);
        // No temporary file left behind.
        assert!(!dir.path().join("BTC.bip47.tmp").exists());
    }

    #[test]
    fn rewrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTC.bip47");

        store(&path, &[&Channel::new(BOB_CODE)]).unwrap();
        store(&path, &[]).unwrap();
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn corrupt_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTC.bip47");
        fs::write(&path, "[{not json").unwrap();
        assert!(matches!(load(&path), Err(SidecarError::Json(_))));
    }
}
