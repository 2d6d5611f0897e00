//! tracing-subscriber setup from the `logging` config section.

use tracing_subscriber::EnvFilter;

use persona_voice_core::config::LoggingConfig;

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(logging: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("info")
    };
    std::iter::once(level.to_string())
        .chain(logging.filters.iter().cloned())
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` wins over the config.
pub fn init(logging: &LoggingConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(logging, verbose)));
    let json = logging.format.eq_ignore_ascii_case("json");
    let stdout = logging.output.eq_ignore_ascii_case("stdout");

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_is_info() {
        assert_eq!(default_directives(&LoggingConfig::default(), false), "info");
    }

    #[test]
    fn test_verbose_overrides_level_and_keeps_filters() {
        let logging = LoggingConfig {
            level: Some("warn".into()),
            filters: vec!["persona_voice_gateway=trace".into(), "hyper=warn".into()],
            ..LoggingConfig::default()
        };
        assert_eq!(
            default_directives(&logging, false),
            "warn,persona_voice_gateway=trace,hyper=warn"
        );
        assert!(default_directives(&logging, true).starts_with("debug,"));
    }
}
