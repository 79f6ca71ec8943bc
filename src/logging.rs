use std::sync::Once;

use log::LevelFilter;

/// GPU stack crates are chatty at `info`; keep them at `warn` unless the
/// filter names them.
const QUIET_CRATES: [&str; 4] = ["wgpu_core", "wgpu_hal", "naga", "winit"];

/// Logger settings. `filter` uses `env_logger` syntax such as
/// `"debug"` or `"umbra=trace,wgpu_core=info"`.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub write_style: Option<env_logger::WriteStyle>,
}

impl LoggingConfig {
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..Self::default()
        }
    }

    /// Explicit filter first, then `RUST_LOG`, then `info`.
    fn resolved_filter(&self) -> Option<String> {
        self.filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .filter(|filter| !filter.trim().is_empty())
    }
}

static INIT: Once = Once::new();

/// Installs the global logger. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(LevelFilter::Info);
        for name in QUIET_CRATES {
            builder.filter_module(name, LevelFilter::Warn);
        }
        if let Some(filter) = config.resolved_filter() {
            builder.parse_filters(&filter);
        }
        builder.write_style(config.write_style.unwrap_or(env_logger::WriteStyle::Auto));

        if builder.try_init().is_ok() {
            log::debug!("logging initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        let config = LoggingConfig::with_filter("umbra=trace");
        assert_eq!(config.resolved_filter().as_deref(), Some("umbra=trace"));
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(LoggingConfig::with_filter("warn"));
        init_logging(LoggingConfig::default());
        log::warn!("still alive");
    }
}
