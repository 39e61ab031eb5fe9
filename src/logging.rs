//! Log subscriber setup and log text masking.

use regex::Regex;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. `SNIP_LOG` takes precedence over `level`.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_env("SNIP_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn ansi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI pattern"))
}

/// Remove ANSI escape sequences so user-supplied text cannot drive the
/// terminal through log output.
pub fn remove_ansi(text: &str) -> String {
    ansi_pattern().replace_all(text, "").into_owned()
}
