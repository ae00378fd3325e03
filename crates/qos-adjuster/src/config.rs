//! Engine-level configuration shared by every adjuster.

use std::time::Duration;

/// Default lifetime of the pin used to trigger staging.
///
/// Long enough for the pin manager to select a pool and start the stage,
/// far too short to hold the file for client use.
pub const DEFAULT_STAGE_PIN_LIFETIME: Duration = Duration::from_secs(30);

/// Tunables for the adjustment engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjusterConfig {
    /// Maximum number of adjuster waits running at once on the worker pool.
    pub max_concurrent: usize,
    /// Upper bound on any single reply wait. `None` trusts the remote side's
    /// own timeouts.
    pub max_reply_wait: Option<Duration>,
    /// Lifetime requested for staging pins.
    pub stage_pin_lifetime: Duration,
    /// Host placed in the synthetic staging protocol descriptor.
    pub stage_protocol_host: String,
    /// Port placed in the synthetic staging protocol descriptor.
    pub stage_protocol_port: u16,
}

impl Default for AdjusterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 64,
            max_reply_wait: None,
            stage_pin_lifetime: DEFAULT_STAGE_PIN_LIFETIME,
            stage_protocol_host: "localhost".to_string(),
            stage_protocol_port: 80,
        }
    }
}
