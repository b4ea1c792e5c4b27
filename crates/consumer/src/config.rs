//! Consumer configuration and registration indices.
//!
//! Consumers are addressed by a stable 32-bit index: a per-type base
//! offset plus a 16-bit CRC fingerprint of the configuration, so the
//! same configuration maps to the same index across restarts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Base offset for file consumer indices.
pub const FILE_CONSUMER_BASE_INDEX: i32 = 100_000;
/// Base offset for network consumer indices.
pub const NETWORK_CONSUMER_BASE_INDEX: i32 = 40_000;

/// CRC-16/ARC (polynomial 0x8005, reflected) over raw bytes.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
        }
    }
    crc
}

/// File consumer options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConsumerConfig {
    pub path: PathBuf,
    /// Video encoder name handed to the codec binding.
    pub vcodec: String,
    /// Audio encoder name handed to the codec binding.
    pub acodec: String,
    /// Also write a key-only (alpha) file next to the fill file.
    pub separate_key: bool,
    /// Video bitrate in kbit/s (0 = encoder default).
    pub vrate: u64,
    /// Audio bitrate in kbit/s (0 = encoder default).
    pub arate: u64,
    /// Encoder options as `k=v,k=v`.
    pub options: String,
    /// 4:3 sample aspect ratio for SD formats (16:9 otherwise).
    pub narrow: bool,
}

impl Default for FileConsumerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            vcodec: "libx264".to_string(),
            acodec: "aac".to_string(),
            separate_key: false,
            vrate: 0,
            arate: 0,
            options: String::new(),
            narrow: false,
        }
    }
}

impl FileConsumerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Registration index: stable for a given path.
    pub fn index(&self) -> i32 {
        let key = self.path.to_string_lossy().to_lowercase();
        FILE_CONSUMER_BASE_INDEX + crc16(key.as_bytes()) as i32
    }

    /// Parse the `k=v,k=v` option string; malformed entries are
    /// skipped.
    pub fn parsed_options(&self) -> Vec<(String, String)> {
        parse_options(&self.options)
    }

    /// Path of the key-only companion file: `<stem>_A<ext>`.
    pub fn key_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = self
            .path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        self.path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!("{stem}_A{extension}"))
    }
}

/// Network consumer options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConsumerConfig {
    /// Advertised source name.
    pub name: String,
    /// Receiver groups; empty means unrestricted.
    pub groups: String,
}

impl Default for NetworkConsumerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            groups: String::new(),
        }
    }
}

impl NetworkConsumerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Registration index: stable for a given name.
    pub fn index(&self) -> i32 {
        NETWORK_CONSUMER_BASE_INDEX + crc16(self.name.as_bytes()) as i32
    }
}

fn parse_options(options: &str) -> Vec<(String, String)> {
    options
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            let value = value.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_known_vector() {
        // CRC-16/ARC check value.
        assert_eq!(crc16(b"123456789"), 0xBB3D);
        assert_eq!(crc16(b""), 0x0000);
    }

    #[test]
    fn file_index_is_stable_and_case_insensitive() {
        let a = FileConsumerConfig::new("out/Capture.MXF");
        let b = FileConsumerConfig::new("out/capture.mxf");
        assert_eq!(a.index(), b.index());
        assert_eq!(a.index(), a.index());
        assert!(a.index() >= FILE_CONSUMER_BASE_INDEX);
    }

    #[test]
    fn different_paths_give_different_indices() {
        let a = FileConsumerConfig::new("a.mov");
        let b = FileConsumerConfig::new("b.mov");
        assert_ne!(a.index(), b.index());
    }

    #[test]
    fn network_index_is_stable() {
        let a = NetworkConsumerConfig::new("playout-1");
        let b = NetworkConsumerConfig::new("playout-1");
        assert_eq!(a.index(), b.index());
        assert!(a.index() >= NETWORK_CONSUMER_BASE_INDEX);
        assert!(a.index() < FILE_CONSUMER_BASE_INDEX);
    }

    #[test]
    fn options_parse_key_value_pairs() {
        let config = FileConsumerConfig {
            options: "preset=veryfast, g=25,profile=high".to_string(),
            ..FileConsumerConfig::new("x.mp4")
        };
        assert_eq!(
            config.parsed_options(),
            vec![
                ("preset".to_string(), "veryfast".to_string()),
                ("g".to_string(), "25".to_string()),
                ("profile".to_string(), "high".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_options_are_skipped() {
        let config = FileConsumerConfig {
            options: "novalue,=bad,ok=1".to_string(),
            ..FileConsumerConfig::new("x.mp4")
        };
        assert_eq!(
            config.parsed_options(),
            vec![("ok".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn key_path_gets_suffix() {
        let config = FileConsumerConfig::new("media/show.mov");
        assert_eq!(config.key_path(), PathBuf::from("media/show_A.mov"));

        let bare = FileConsumerConfig::new("show");
        assert_eq!(bare.key_path(), PathBuf::from("show_A"));
    }

    #[test]
    fn defaults_match_broadcast_conventions() {
        let config = FileConsumerConfig::default();
        assert_eq!(config.vcodec, "libx264");
        assert_eq!(config.acodec, "aac");
        assert!(!config.separate_key);
        assert!(!config.narrow);

        let net = NetworkConsumerConfig::default();
        assert_eq!(net.name, "default");
        assert!(net.groups.is_empty());
    }
}
