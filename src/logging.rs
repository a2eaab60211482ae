use color_eyre::Result;
use color_eyre::eyre::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` wins over `tracing_level` when set.
pub fn init_tracing(tracing_level: &str) -> Result<()> {
    let filter_layer = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(tracing_level).wrap_err("Failed to create tracing filter")?,
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .wrap_err("Failed to install tracing subscriber")?;

    Ok(())
}
