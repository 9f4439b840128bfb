//! Log setup for the `verify` binary.
//!
//! Logs go to stderr; stdout is reserved for reports.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Default directives when `RUST_LOG` is unset: `level` for this workspace's
/// crates, warnings for everything else.
fn default_directives(level: Level) -> String {
    format!("warn,verify_core={level},verify={level}")
}

/// Install the global subscriber. Only the first call in a process has any
/// effect.
///
/// * `json`: newline-delimited JSON instead of compact text lines.
/// * `level`: verbosity of the workspace crates when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let layer = if json {
        layer.json().boxed()
    } else {
        layer.compact().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,verify_core=DEBUG,verify=DEBUG"
        );
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
