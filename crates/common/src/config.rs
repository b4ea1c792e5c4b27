//! Channel configuration.

use serde::{Deserialize, Serialize};

use crate::format::VideoFormat;

/// Top-level configuration for one playout channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Target video format every stage is paced against.
    pub format: VideoFormat,
    /// Interleaved audio channel count.
    pub audio_channels: usize,
    /// 1-based channel index, reported to consumers at initialize.
    pub channel_index: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            format: VideoFormat::Pal,
            audio_channels: 2,
            channel_index: 1,
        }
    }
}
