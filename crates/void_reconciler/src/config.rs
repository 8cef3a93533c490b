//! Reconciler configuration

use serde::{Deserialize, Serialize};
use void_scheduler::SchedulerConfig;

use crate::error::{ReconcileError, Result};
use crate::lane::{Lane, Lanes};

/// How long each class of lane may wait before it is treated as starved and
/// rendered without yielding. `None` never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirationPolicy {
    pub sync_ms: u64,
    pub input_continuous_ms: u64,
    pub default_ms: u64,
    pub transition_ms: u64,
    pub retry_ms: Option<u64>,
    pub idle_ms: Option<u64>,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            sync_ms: 250,
            input_continuous_ms: 250,
            default_ms: 5000,
            transition_ms: 5000,
            retry_ms: None,
            idle_ms: None,
        }
    }
}

impl ExpirationPolicy {
    /// Timeout for a single lane
    pub fn timeout_for(&self, lane: Lane) -> Option<u64> {
        if lane.includes_some(Lanes::SYNC) {
            Some(self.sync_ms)
        } else if lane.includes_some(Lanes::INPUT_CONTINUOUS) {
            Some(self.input_continuous_ms)
        } else if lane.includes_some(Lanes::DEFAULT) {
            Some(self.default_ms)
        } else if lane.is_transition() {
            Some(self.transition_ms)
        } else if lane.includes_some(Lanes::RETRY_LANES) {
            self.retry_ms
        } else {
            self.idle_ms
        }
    }
}

/// When passive effects run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassiveEffectMode {
    /// In a separate normal-priority task after commit
    #[default]
    Deferred,
    /// At the end of the commit that produced them
    Synchronous,
}

/// Reconciler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Time slice for concurrent rendering
    pub frame_yield_ms: u64,
    /// Starvation timeouts
    pub expiration: ExpirationPolicy,
    /// Render the default lane time-sliced instead of blocking
    pub time_slice_default_lane: bool,
    /// Entangle transition updates queued on the same fiber
    pub entangle_transitions: bool,
    /// Consecutive synchronous re-commits of a root before failing it
    pub nested_update_limit: u32,
    /// When passive effects run
    pub passive_effects: PassiveEffectMode,
    /// Arena size that triggers a post-commit sweep
    pub gc_threshold: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            frame_yield_ms: 5,
            expiration: ExpirationPolicy::default(),
            time_slice_default_lane: false,
            entangle_transitions: true,
            nested_update_limit: 50,
            passive_effects: PassiveEffectMode::Deferred,
            gc_threshold: 256,
        }
    }
}

impl ReconcilerConfig {
    /// Parse from TOML; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ReconcileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the reconciler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.frame_yield_ms == 0 {
            return Err(ReconcileError::Config(
                "frame_yield_ms must be at least 1".into(),
            ));
        }
        if self.nested_update_limit == 0 {
            return Err(ReconcileError::Config(
                "nested_update_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Scheduler configuration matching this policy
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            frame_yield_ms: self.frame_yield_ms,
            user_blocking_timeout_ms: self.expiration.input_continuous_ms,
            normal_timeout_ms: self.expiration.default_ms,
            ..SchedulerConfig::default()
        }
    }
}
