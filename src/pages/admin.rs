use dioxus::prelude::*;

use crate::router::{session::UserSession, table::RoutePattern};

use super::Page;

pub fn admin_index(
    user: UserSession,
    patterns: Vec<RoutePattern>,
    logout_url: String,
) -> Page<'static> {
    let display_name = user.display_name();
    let username = user.username;

    Page {
        title: rsx! { "Site administration" },
        head: None,
        content: rsx! {
            header {
                h1 { "Site administration" }
                p {
                    "signed in as {display_name} ("
                    code { username }
                    ") "
                    a { href: "{logout_url}", "log out" }
                }
            }

            section {
                h2 { "URL patterns" }
                table {
                    thead {
                        tr {
                            th { "pattern" }
                            th { "name" }
                        }
                    }
                    tbody {
                        patterns.iter().map(|pattern| {
                            let path = format!("/{}", pattern.pattern);
                            let name = pattern.name.as_deref().unwrap_or("");

                            rsx! {
                                tr {
                                    td { code { path } }
                                    td { name }
                                }
                            }
                        })
                    }
                }
            }
        },
    }
}
