//! Operator diagnostics for processes hosting a wait-approval stage.
//!
//! The user-facing stage log goes through `StageClient::log_info` and
//! `log_error`. This module only wires the `approval.*` tracing events and
//! the executor span to the process's stderr, or to JSON lines for log
//! shippers.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested level; everything else is WARN.
const STAGE_TARGETS: &[&str] = &["wait_approval", "stage_client", "wait_approval_cli"];

/// Filter used when `RUST_LOG` is unset.
fn default_directives(level: Level) -> String {
    let mut directives = vec![Level::WARN.as_str().to_lowercase()];
    for target in STAGE_TARGETS {
        directives.push(format!("{target}={}", level.as_str().to_lowercase()));
    }
    directives.join(",")
}

/// Install the process-wide subscriber for a stage host.
///
/// `RUST_LOG` overrides `level`. Only the first call in a process takes
/// effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
