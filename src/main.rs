use std::sync::Arc;

use adf_portal::{
    adfs::AdfsProvider,
    router::{self, AppState},
    AdfsEnvironment, HttpEnvironment, SentryEnvironment,
};
use color_eyre::eyre::Context;
use tracing::debug;

fn main() -> color_eyre::Result<()> {
    let _sentry = adf_portal::initialize(env!("CARGO_CRATE_NAME"), SentryEnvironment::from_env()?)?;

    let http = HttpEnvironment::from_env()?;
    let adfs = AdfsEnvironment::from_env()?;
    debug!(?http, ?adfs, "loaded environment");

    let state = AppState {
        key: http.cookie_key()?,
        adfs: Arc::new(AdfsProvider::new(adfs)),
    };

    // Drop into the async runtime after the initial setup
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start the tokio runtime")?
        .block_on(router::serve(http, state))
}
