use crate::reports::WorkingDaysScope;
use std::path::PathBuf;
use tracing::warn;

pub const WORKSPACE_ENV: &str = "ATTENDANCE_WORKSPACE";
pub const WORKING_DAYS_SCOPE_ENV: &str = "ATTENDANCE_WORKING_DAYS_SCOPE";

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Opened at startup so the caller may skip `workspace.select`.
    pub workspace: Option<PathBuf>,
    pub working_days_scope: WorkingDaysScope,
}

impl Config {
    /// Reads the process environment after `.env` (if any) has been loaded.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workspace = lookup(WORKSPACE_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let working_days_scope = match lookup(WORKING_DAYS_SCOPE_ENV) {
            None => WorkingDaysScope::default(),
            Some(raw) => raw.parse::<WorkingDaysScope>().unwrap_or_else(|e| {
                warn!(value = %raw, error = %e, "ignoring {}", WORKING_DAYS_SCOPE_ENV);
                WorkingDaysScope::default()
            }),
        };

        Config {
            workspace,
            working_days_scope,
        }
    }
}
