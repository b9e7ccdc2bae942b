//! Logging setup for the index engine and CLI.
//!
//! Log lines are compact (`HH:MM:SS.mmm LEVEL target: [component] message`) and
//! filtered per module. `RUST_LOG` overrides whatever the settings file says:
//!
//! ```bash
//! RUST_LOG=hdlindex::indexing=debug hdlindex index rtl/
//! ```
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "hdlindex::indexing" = "info"
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from settings.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.default.clone();
    for (module, level) in &config.modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);

        // A subscriber installed by an embedding application wins.
        let _ = tracing_subscriber::registry().with(layer).try_init();
    });
}

/// Install the subscriber with default settings (`warn`).
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Info-level event tagged with a component.
///
/// ```ignore
/// log_event!("index", "state", "{:?}", IndexState::FileTreeValid);
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-level event tagged with a component.
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
