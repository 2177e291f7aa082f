use tracing_subscriber::EnvFilter;

const CRATES: [&str; 4] = [
    "tributary_cli",
    "tributary_engine",
    "tributary_store",
    "tributary_types",
];

/// Filter directives that apply `log_level` to the Tributary crates and keep
/// everything else at `warn`.
fn directives(log_level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|c| format!("{c}={log_level}")));
    directives.join(",")
}

/// Initialize structured logging with tracing-subscriber.
///
/// Uses the `RUST_LOG` env var if set, otherwise falls back to the provided level.
pub fn init(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_applies_to_own_crates_only() {
        let d = directives("debug");
        assert!(d.starts_with("warn,"));
        assert!(d.contains("tributary_engine=debug"));
        assert!(d.contains("tributary_store=debug"));
        assert!(EnvFilter::try_new(&d).is_ok());
    }
}
