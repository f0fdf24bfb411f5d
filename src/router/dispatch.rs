use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{uri::PathAndQuery, Request, Uri},
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;
use tracing::{debug, trace, Span};

use super::table::{RoutePattern, RouteTable};
use crate::pages;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no view is named `{0}`")]
pub struct NoReverseMatch(pub String);

/// Read only handle on the route table, given to every view as an extension
/// so it can build links to other views.
#[derive(Debug, Clone)]
pub struct Urls(Arc<RouteTable>);

impl Urls {
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self(table)
    }

    pub fn reverse(&self, name: &str) -> Option<String> {
        self.0.reverse(name)
    }

    /// Like [`Urls::reverse`] but an unknown name is an error
    pub fn url(&self, name: &str) -> Result<String, NoReverseMatch> {
        self.reverse(name)
            .ok_or_else(|| NoReverseMatch(name.to_string()))
    }

    pub fn patterns(&self) -> Vec<RoutePattern> {
        self.0.patterns()
    }

    pub fn table(&self) -> &RouteTable {
        &self.0
    }
}

/// Fallback service that sends every request through the route table
pub async fn dispatch(
    State(table): State<Arc<RouteTable>>,
    mut request: Request<Body>,
) -> Response {
    let path = request.uri().path().to_string();
    let resolved = table.resolve(&path);

    // Only exact views are worth a redirect, and only when the path itself
    // was not an exact match
    let exact_match = matches!(&resolved, Ok(matched) if !matched.partial);
    if !exact_match && !path.ends_with('/') {
        let slashed = table.resolve(&format!("{path}/"));

        if matches!(slashed, Ok(matched) if !matched.partial) {
            if let Some(location) = append_slash(request.uri()) {
                debug!(%location, "redirecting to path with trailing slash");
                return Redirect::permanent(&location.to_string()).into_response();
            }
        }
    }

    match resolved {
        Ok(matched) => {
            Span::current().record("route", matched.route.as_str());
            trace!(route = %matched.route, view = ?matched.view_name(), "resolved request");

            request.extensions_mut().insert(Urls::new(table.clone()));
            matched.endpoint.handle(request).await
        }
        Err(not_found) => {
            debug!(%not_found, "no route matched");
            pages::not_found(&not_found.path)
        }
    }
}

/// `uri` with a slash appended to its path, keeping the query
fn append_slash(uri: &Uri) -> Option<PathAndQuery> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{}/?{query}", uri.path()),
        None => format!("{}/", uri.path()),
    };

    path_and_query.parse().ok()
}
