use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::Location,
};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dioxus::prelude::*;
use tracing_error::SpanTrace;

use crate::router::middleware::{catch_panic::CaughtPanic, request_metadata::RequestMetadata};

use super::Page;

pub fn not_found(path: &str) -> Response {
    self::error(
        StatusCode::NOT_FOUND,
        rsx! {
            div {
                code { path }
                " not found"
            }
        },
    )
    .into_response()
}

#[derive(Debug)]
pub struct ClientError {
    message: String,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for ClientError {
    fn into_response(self) -> Response {
        self::error(
            StatusCode::BAD_REQUEST,
            rsx! {
                div { self.message }
            },
        )
        .into_response()
    }
}

#[derive(Debug)]
pub struct Forbidden {
    message: String,
}

impl Forbidden {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for Forbidden {
    fn into_response(self) -> Response {
        self::error(
            StatusCode::FORBIDDEN,
            rsx! {
                div { self.message }
            },
        )
        .into_response()
    }
}

pub struct InternalServerError {
    inner_error: Box<dyn std::error::Error + Send + Sync>,
    span_trace: SpanTrace,
    backtrace: Backtrace,
    caller: &'static Location<'static>,
}

impl InternalServerError {
    #[inline(always)]
    fn throw(self) -> Self {
        // FIXME: attach the span trace to the sentry event
        tracing::error!(caller=%self.caller, error=%self.inner_error, "encountered an error serving a page");

        self
    }
}

impl<E> From<E> for InternalServerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn from(value: E) -> Self {
        Self {
            inner_error: Box::new(value),
            span_trace: SpanTrace::capture(),
            backtrace: Backtrace::capture(),
            caller: Location::caller(),
        }
        .throw()
    }
}

impl IntoResponse for InternalServerError {
    fn into_response(self) -> Response {
        let error_message = self.inner_error.to_string();
        let caller = self.caller.to_string();
        let span_trace = self.span_trace.to_string();
        let backtrace = render_backtrace(&self.backtrace);

        self::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            if cfg!(debug_assertions) {
                rsx! {
                    h3 { "Error" }
                    pre { code { error_message } }

                    h3 { "Source" }
                    pre { code { caller } }

                    h3 { "Span Trace" }
                    pre { code { span_trace } }

                    h3 { "Backtrace" }
                    pre { code { backtrace } }
                }
            } else {
                rsx! {""}
            },
        )
        .into_response()
    }
}

fn render_backtrace(backtrace: &Backtrace) -> String {
    match backtrace.status() {
        BacktraceStatus::Captured => backtrace.to_string(),
        BacktraceStatus::Unsupported => "capturing backtraces is unsupported".to_string(),
        BacktraceStatus::Disabled => {
            "capturing of backtraces is disabled, enable with RUST_BACKTRACE=1".to_string()
        }
        status => format!("backtrace is in an unknown state: {status:?}"),
    }
}

pub fn panic_error(request_metadata: &RequestMetadata, panic_info: CaughtPanic) -> Response {
    let request_id = request_metadata.request_id.clone();
    let server = request_metadata.server;
    let build = format!("{} {} ({})", server.name, server.version, server.commit);
    let message = panic_info
        .payload_str()
        .unwrap_or("Unknown panic message")
        .to_string();
    let location = panic_info
        .location()
        .map(ToString::to_string)
        .unwrap_or_else(|| "Unknown".to_string());
    let span_trace = panic_info
        .span_trace()
        .map(ToString::to_string)
        .unwrap_or_default();
    let backtrace = panic_info
        .backtrace()
        .map(render_backtrace)
        .unwrap_or_default();

    self::error(
        StatusCode::INTERNAL_SERVER_ERROR,
        if cfg!(debug_assertions) {
            rsx! {
                div { "The application panicked." }
                div { "Message: {message}" }
                div { "Location: {location}" }
                div { "Request: {request_id}" }
                div { "Server: {build}" }

                h2 { "Span Trace" }
                pre { code { span_trace } }

                h2 { "Backtrace" }
                pre { code { backtrace } }
            }
        } else {
            rsx! {
                div { "Request: {request_id}" }
                div { "Server: {build}" }
            }
        },
    )
    .into_response()
}

fn error<'a>(status: StatusCode, body: LazyNodes<'a, 'a>) -> (StatusCode, Page<'a>) {
    let status_code = status.as_u16();
    let status_reason = status.canonical_reason().unwrap_or("Unknown Error");

    (
        status,
        Page {
            title: rsx! { "{status_code} ({status_reason})" },
            head: None,
            content: rsx! {
                header {
                    class: "error_message",
                    "{status_code} | {status_reason}"
                }
                main {
                    body
                },
                nav {
                    a { href: "/", "return home" }
                },
            },
        },
    )
}
