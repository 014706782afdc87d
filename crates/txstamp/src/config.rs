// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reconciliation configuration.

use std::time::Duration;

use crate::error::ReconcileError;
use crate::report::ReportFlags;

/// Default timestamp tolerance (500 ms).
pub const DEFAULT_TOLERANCE: Duration = Duration::from_millis(500);

/// Environment variable overriding the tolerance (milliseconds).
pub const ENV_TOLERANCE_MS: &str = "TXSTAMP_TOLERANCE_MS";

/// Environment variable overriding the FIN requirement (`true`/`false`).
pub const ENV_REQUIRE_FIN: &str = "TXSTAMP_REQUIRE_FIN";

/// Environment variable overriding the SYN sentinel policy (`true`/`false`).
pub const ENV_ACCEPT_SYN_SENTINEL: &str = "TXSTAMP_ACCEPT_SYN_SENTINEL";

/// Knobs of a single reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Maximum allowed `|adjusted report time - capture time|`.
    pub tolerance: Duration,

    /// Clock-state flags every report is expected to carry.
    /// Default: CLOCK_SET | CLOCK_IN_SYNC.
    pub clock_flags: ReportFlags,

    /// Fail TCP reconciliation when no FIN was captured.
    pub require_fin: bool,

    /// Accept `u32::MAX` as the start of a SYN report.
    pub accept_syn_sentinel: bool,
}

impl ReconcileConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            clock_flags: ReportFlags::CLOCK_SET | ReportFlags::CLOCK_IN_SYNC,
            require_fin: true,
            accept_syn_sentinel: true,
        }
    }

    /// Defaults overridden by `TXSTAMP_*` environment variables.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(ms) = std::env::var(ENV_TOLERANCE_MS)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            config.tolerance = Duration::from_millis(ms);
        }
        if let Some(v) = env_bool(ENV_REQUIRE_FIN) {
            config.require_fin = v;
        }
        if let Some(v) = env_bool(ENV_ACCEPT_SYN_SENTINEL) {
            config.accept_syn_sentinel = v;
        }
        config
    }

    /// Set the timestamp tolerance.
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the expected clock-state flags.
    pub fn with_clock_flags(mut self, flags: ReportFlags) -> Self {
        self.clock_flags = flags;
        self
    }

    /// Require (or not) a FIN at the end of a TCP capture.
    pub fn with_require_fin(mut self, require: bool) -> Self {
        self.require_fin = require;
        self
    }

    /// Accept (or reject) the SYN start sentinel.
    pub fn with_syn_sentinel(mut self, accept: bool) -> Self {
        self.accept_syn_sentinel = accept;
        self
    }

    /// Preset for connections still open when the capture stopped.
    pub fn open_connection() -> Self {
        Self::new().with_require_fin(false)
    }

    /// Tolerance in nanoseconds.
    pub fn tolerance_ns(&self) -> u128 {
        self.tolerance.as_nanos()
    }

    /// Check the config is usable.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.clock_flags.intersects(ReportFlags::TCP_ONLY | ReportFlags::DROPPED) {
            return Err(ReconcileError::config(format!(
                "clock_flags may only hold CLOCK_SET/CLOCK_IN_SYNC, got {}",
                self.clock_flags
            )));
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
