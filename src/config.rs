use std::collections::HashSet;
use std::path::PathBuf;

/// Analyzer configuration options.
///
/// `AnalyzerConfig` uses the `#[non_exhaustive]` attribute to indicate that
/// fields may be added even in a point release. Users should start with
/// `AnalyzerConfig::default()` and then change the settings they want to
/// change.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct AnalyzerConfig {
    /// Names of the functions whose blocks the associator should emit.
    /// Blocks of other functions still consume their trace records but are
    /// discarded, which lets a run analyze a window of the trace.
    ///
    /// `None` emits everything.
    ///
    /// Default is `None`.
    pub interesting_funcs: Option<HashSet<String>>,

    /// If set, every (instruction, event) pair processed while the current
    /// guest IP equals this value is logged, and every message emitted there
    /// is mirrored to the log. This is purely diagnostic; it has no effect
    /// on the analysis state.
    ///
    /// Default is `None`.
    pub debug_ip: Option<u64>,

    /// If `true`, progress lines at roughly 1% granularity are written to
    /// the diagnostic log during evaluation.
    ///
    /// Default is `true`.
    pub progress_updates: bool,

    /// Controls which messages are recorded when the driver routes logs to a
    /// file: `DEBUG` and higher (`true`) or only `INFO` and higher
    /// (`false`).
    ///
    /// Default is `false`.
    pub debug_logging: bool,

    /// If set, the driver routes detailed logs to this file instead of
    /// stderr.
    ///
    /// Default is `None`.
    pub log_file: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            interesting_funcs: None,
            debug_ip: None,
            progress_updates: true,
            debug_logging: false,
            log_file: None,
        }
    }
}
