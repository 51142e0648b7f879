use std::time::Duration;

use bandhub_transport::DEFAULT_PEAK_COUNT;
use serde::{Deserialize, Serialize};

use crate::markers::MARKER_WIDTH;
use crate::session::CommentFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub peak_count: usize,
    pub skip_seconds: f64,
    pub rate_step: f64,
    pub marker_width: f64,
    pub default_filter: CommentFilter,
    pub keys: KeyConfig,
    pub resubscribe: ResubscribeConfig,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            peak_count: DEFAULT_PEAK_COUNT,
            skip_seconds: 5.0,
            rate_step: 0.1,
            marker_width: MARKER_WIDTH,
            default_filter: CommentFilter::All,
            keys: KeyConfig::default(),
            resubscribe: ResubscribeConfig::default(),
        }
    }
}

/// Single-character shortcut keys. Arrow keys are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub toggle_play: char,
    pub comment: char,
    pub slower: char,
    pub faster: char,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            toggle_play: ' ',
            comment: 'c',
            slower: ';',
            faster: '\'',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResubscribeConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl ResubscribeConfig {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl Default for ResubscribeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}
