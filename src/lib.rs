use std::borrow::Cow;

use tracing::metadata::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod adfs;
pub mod environment;
pub mod pages;
pub mod router;
pub mod urls;

pub use environment::{AdfsEnvironment, HttpEnvironment, SentryEnvironment};

/// Install error reporting, logging and sentry. The returned guard flushes
/// pending sentry events when dropped.
pub fn initialize(
    crate_name: &str,
    sentry: SentryEnvironment,
) -> color_eyre::Result<sentry::ClientInitGuard> {
    // Setup error reporting
    color_eyre::install()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty())
        .with(
            EnvFilter::from_default_env()
                .add_directive(LevelFilter::INFO.into())
                .add_directive(format!("{}=trace", env!("CARGO_CRATE_NAME")).parse()?)
                .add_directive(format!("{}=trace", crate_name).parse()?),
        )
        .with(ErrorLayer::default())
        .with(sentry::integrations::tracing::layer())
        .try_init()?;

    // Setup sentry, which does nothing without a DSN
    Ok(sentry::init(sentry::ClientOptions {
        dsn: sentry.dsn,
        release: sentry::release_name!(),
        environment: sentry.environment.map(Cow::Owned),
        traces_sample_rate: 1.0,
        attach_stacktrace: true,
        ..Default::default()
    }))
}
