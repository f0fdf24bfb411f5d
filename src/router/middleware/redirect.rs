use axum::{
    body::{Body, BoxBody},
    extract::{Host, State},
    http::{
        uri::{Authority, Parts, Scheme},
        Request, Response, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Redirect},
};
use tracing::{trace, trace_span, warn};

/// Permanently redirect requests for any other host to the canonical domain,
/// keeping the path and query.
pub async fn redirect_to_domain(
    State(expected_host): State<Authority>,
    Host(host): Host,
    req: Request<Body>,
    next: Next<Body>,
) -> Response<BoxBody> {
    if host == expected_host.as_str() {
        return next.run(req).await;
    }

    let redirect = trace_span!("redirect_to_domain", %expected_host, %host).in_scope(|| {
        let mut parts = Parts::default();
        // Inherit path and query from request
        parts.path_and_query = req.uri().path_and_query().cloned();

        parts.authority = Some(expected_host);
        parts.scheme = Some(if cfg!(debug_assertions) {
            Scheme::HTTP
        } else {
            Scheme::HTTPS
        });

        trace!("URI authority did not match configured DOMAIN");

        Uri::from_parts(parts)
    });

    match redirect {
        Ok(uri) => Redirect::permanent(&uri.to_string()).into_response(),
        Err(error) => {
            warn!(%error, "unable to build canonical redirect, serving request as is");
            next.run(req).await
        }
    }
}
