//! VM configuration.

use std::env;

/// Bytes allocated before the first collection.
pub const DEFAULT_GC_THRESHOLD: usize = 1024 * 1024;

/// After a collection the next threshold is the surviving bytes times this.
pub const DEFAULT_GC_GROWTH_FACTOR: usize = 2;

/// Settings for a [`Vm`](crate::vm::Vm).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    pub initial_gc_threshold: usize,
    pub gc_growth_factor: usize,
    /// Collect before every allocation.
    pub stress_gc: bool,
    /// Log collector activity to stderr.
    pub log_gc: bool,
    /// Print the stack and each instruction before it runs.
    pub trace_execution: bool,
    /// Disassemble every function after it compiles.
    pub print_code: bool,
    /// Print compile diagnostics and runtime backtraces to stderr.
    pub report_errors: bool,
    /// Collect `print` output in `Vm::output` instead of writing to stdout.
    pub capture_output: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            initial_gc_threshold: DEFAULT_GC_THRESHOLD,
            gc_growth_factor: DEFAULT_GC_GROWTH_FACTOR,
            stress_gc: false,
            log_gc: false,
            trace_execution: false,
            print_code: false,
            report_errors: true,
            capture_output: false,
        }
    }
}

impl VmConfig {
    /// Defaults overridden by `ROTO_*` environment variables:
    ///
    /// - `ROTO_LOG_GC`, `ROTO_STRESS_GC`, `ROTO_TRACE`, `ROTO_PRINT_CODE`: any
    ///   value other than `0` or `false` turns the switch on.
    /// - `ROTO_GC_THRESHOLD`: initial threshold in bytes.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.log_gc = env_flag("ROTO_LOG_GC");
        config.stress_gc = env_flag("ROTO_STRESS_GC");
        config.trace_execution = env_flag("ROTO_TRACE");
        config.print_code = env_flag("ROTO_PRINT_CODE");
        if let Some(threshold) = env::var("ROTO_GC_THRESHOLD")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            config.initial_gc_threshold = threshold;
        }
        config
    }

    /// Configuration for embedding in tests: quiet, with captured output.
    pub fn captured() -> Self {
        Self {
            report_errors: false,
            capture_output: true,
            ..Self::default()
        }
    }
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => parse_flag(&value),
        Err(_) => false,
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.initial_gc_threshold, 1024 * 1024);
        assert_eq!(config.gc_growth_factor, 2);
        assert!(config.report_errors);
        assert!(!config.capture_output);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("False"));
        assert!(!parse_flag(""));
    }
}
