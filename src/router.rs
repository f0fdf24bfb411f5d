use std::{sync::Arc, time::Duration};

use axum::{
    extract::FromRef,
    http::{header, uri::Authority},
    Router,
};
use axum_extra::extract::cookie::Key;
use color_eyre::eyre::Context;
use tower_http::{
    request_id::MakeRequestUuid, timeout::TimeoutLayer, trace::TraceLayer, ServiceBuilderExt,
};
use tracing::{debug, info, warn};

use middleware::{
    catch_panic::catch_panic_layer, server_information, trace::SpanMaker,
};

use crate::{adfs::AdfsProvider, environment::HttpEnvironment, urls};

pub mod admin;
pub mod authentication;
pub mod debug;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod middleware;
pub mod session;
pub mod table;

/// State shared by every view that needs it
#[derive(Clone, FromRef)]
pub struct AppState {
    /// Encrypts the session and login state cookies
    pub key: Key,
    pub adfs: Arc<AdfsProvider>,
}

/// The whole site: the route table behind the middleware stack
pub fn app(domain: Authority, state: AppState) -> color_eyre::Result<Router> {
    let table = urls::url_patterns(&state).wrap_err("route table is invalid")?;
    debug!(routes = table.patterns().len(), "built route table");

    Ok(Router::new()
        .fallback(dispatch::dispatch)
        .with_state(Arc::new(table))
        .layer(
            tower::ServiceBuilder::new()
                // Hide sensitive headers
                .sensitive_headers([header::AUTHORIZATION, header::COOKIE, header::SET_COOKIE])
                // Give a unique identifier to every request
                .set_x_request_id(MakeRequestUuid)
                .propagate_x_request_id()
                // Send traces to sentry
                .layer(sentry::integrations::tower::NewSentryLayer::new_from_top())
                .layer(sentry::integrations::tower::SentryHttpLayer::with_transaction())
                // Trace requests and responses
                .layer(TraceLayer::new_for_http().make_span_with(SpanMaker))
                // Timeout if request or response hangs
                .layer(TimeoutLayer::new(Duration::from_secs(10)))
                // Compress responses
                .map_response_body(axum::body::boxed)
                .compression()
                // Tag responses with the server that produced them
                .layer(axum::middleware::from_fn(server_information::tag_response))
                // Redirect requests that are not to the configured domain
                .layer(axum::middleware::from_fn_with_state(
                    domain,
                    middleware::redirect_to_domain,
                ))
                // Catch Panics in handlers
                .layer(catch_panic_layer(error::internal_server_error_panic)),
        ))
}

pub async fn serve(http: HttpEnvironment, state: AppState) -> color_eyre::Result<()> {
    let app = app(http.domain.clone(), state)?;

    let server = axum::Server::try_bind(&http.bind).wrap_err("failed to bind to given address")?;

    info!(%http.bind, %http.domain, "started http server");
    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("http server failed")?;

    info!("http server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(error) => warn!(%error, "unable to listen for the shutdown signal, shutting down"),
    }
}
