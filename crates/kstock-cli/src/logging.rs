use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` picks the filter (default
/// `warn`, stderr only so stdout stays machine-readable) and
/// `KSTOCK_LOG_FORMAT=json` switches to JSON lines. Records emitted through
/// the `log` facade by kstock-core are captured as well.
pub fn init_tracing() {
    let log_format = std::env::var("KSTOCK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
