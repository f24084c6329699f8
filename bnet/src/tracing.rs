use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer, field::MakeExt, fmt::time::ChronoLocal, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::internal_prelude::*;

/// Log to stderr, so stdout only contains the daemon's responses.
pub fn install_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let timer = ChronoLocal::new("%H:%M:%S".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .map_fmt_fields(|f| f.debug_alt())
        .with_timer(timer)
        .with_writer(std::io::stderr);

    let filter_layer = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()
        .wrap_err("RUST_LOG env variable is invalid")?;

    tracing_subscriber::Registry::default()
        .with(fmt_layer.with_filter(filter_layer))
        .with(tracing_error::ErrorLayer::default())
        .init();

    Ok(())
}
