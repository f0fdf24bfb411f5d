use axum::{
    http,
    response::{IntoResponse, Response},
};
use dioxus::prelude::*;

use crate::router::middleware::server_information::{ServerInformation, SERVER_INFO};

mod admin;
mod error;
mod login;

pub use {
    admin::admin_index,
    error::{not_found, panic_error, ClientError, Forbidden, InternalServerError},
    login::login_successful,
};

/// Skeleton shared by every HTML page the site serves
pub struct Page<'e> {
    pub title: LazyNodes<'e, 'e>,
    pub head: Option<LazyNodes<'e, 'e>>,
    pub content: LazyNodes<'e, 'e>,
}

impl<'e> Page<'e> {
    fn wrap(self) -> LazyNodes<'e, 'e> {
        let ServerInformation { name, version, .. } = SERVER_INFO;

        rsx! {
            head {
                meta { charset: "utf-8"}
                meta {
                    http_equiv: "X-UA-Compatible",
                    content: "IE=edge"
                }
                meta {
                    name: "viewport",
                    content: "width=device-width, initial-scale=1.0"
                }

                title { self.title, " - ADF" }

                self.head
            }
            body {
                self.content

                footer {
                    small { "{name} {version}" }
                }
            }
        }
    }
}

impl<'e> IntoResponse for Page<'e> {
    fn into_response(self) -> Response {
        let headers = [(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/html; charset=UTF-8"),
        )];

        let html = format!(
            "<!DOCTYPE html><html lang=\"en\">{}</html>",
            dioxus_ssr::render_lazy(self.wrap())
        );

        (headers, html).into_response()
    }
}
