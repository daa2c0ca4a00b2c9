//! Driver configuration.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::protocol::{DebuggingTargetBehavior, ModifiedSessionBehavior};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Debugger executable, resolved through PATH if not absolute.
    pub debugger_path: String,
    /// Workspace identifier used as the pipe-name stem.
    pub workspace_name: String,
    /// Run a full breakpoint refresh right after connecting.
    pub sync_breakpoints_on_connect: bool,
    /// Also move the debugger's source cursor when a breakpoint is added.
    pub goto_line_on_new_breakpoint: bool,
    /// Tell the debugger not to raise its window whenever the target
    /// suspends.
    pub suppress_foreground_on_suspend: bool,
    pub connect_retry_initial_ms: u64,
    pub connect_retry_max_ms: u64,
    pub connect_timeout_ms: u64,
    /// What the debugger does with a running target when the session ends.
    pub exit_debug_behavior: DebuggingTargetBehavior,
    /// What the debugger does with unsaved session changes when the
    /// session ends.
    pub exit_session_behavior: ModifiedSessionBehavior,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            debugger_path: "remedybg".to_string(),
            workspace_name: "workspace".to_string(),
            sync_breakpoints_on_connect: true,
            goto_line_on_new_breakpoint: false,
            suppress_foreground_on_suspend: true,
            connect_retry_initial_ms: 50,
            connect_retry_max_ms: 800,
            connect_timeout_ms: 5_000,
            exit_debug_behavior: DebuggingTargetBehavior::IfDebuggingTargetStopDebugging,
            exit_session_behavior: ModifiedSessionBehavior::IfSessionIsModifiedContinueWithoutSaving,
        }
    }
}

impl DriverConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
