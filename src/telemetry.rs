use crate::config::{LogFormat, TelemetryConfig};
use std::sync::Once;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the tracing subscriber for a hosting application.
///
/// Metric instruments in this crate go through the OpenTelemetry global
/// meter; installing a meter provider is left to the host.
pub fn init_tracing(config: &TelemetryConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into())
        .add_directive("sqlx=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    let registry = Registry::default().with(filter);

    match config.log_format {
        LogFormat::Text => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
        LogFormat::Json => {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        }
    }

    Ok(())
}

/// Initializes tracing once for unit tests; safe to call from every test.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("internlink_sync=debug".parse().expect("static directive"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
