use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use const_format::formatcp;
use git_version::git_version;

/// Identity of this build, fixed at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInformation {
    pub name: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    /// `development` or `production`
    pub profile: &'static str,
}

pub const SERVER_INFO: ServerInformation = ServerInformation {
    name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    commit: git_version!(args = ["--always"], fallback = "unknown"),
    profile: if cfg!(debug_assertions) {
        "development"
    } else {
        "production"
    },
};

/// `name@version (commit ...)`, sent as `x-origin-server`
pub const ORIGIN: &str = formatcp!(
    "{}@{} (commit {})",
    SERVER_INFO.name,
    SERVER_INFO.version,
    SERVER_INFO.commit
);

/// Tag every response with the build that produced it
pub async fn tag_response(request: Request<Body>, next: Next<Body>) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-origin-server"),
        HeaderValue::from_static(ORIGIN),
    );
    headers.insert(
        HeaderName::from_static("x-server-environment"),
        HeaderValue::from_static(SERVER_INFO.profile),
    );

    response
}
