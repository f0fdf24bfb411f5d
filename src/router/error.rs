use axum::response::Response;
use tracing::error;

use crate::pages;

use super::middleware::{catch_panic::CaughtPanic, RequestMetadata};

pub fn internal_server_error_panic(request_metadata: RequestMetadata, info: CaughtPanic) -> Response {
    let location = match info.location() {
        Some(location) => location.to_string(),
        None => "Unknown".to_string(),
    };

    if let Some(panic) = info.payload_str() {
        error!(%panic, %location, request_id = %request_metadata.request_id, "service panicked");
    } else {
        error!(
            %location,
            request_id = %request_metadata.request_id,
            "service panicked but panic info was not a &str or String"
        );
    }

    pages::panic_error(&request_metadata, info)
}
