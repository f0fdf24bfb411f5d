use dioxus::prelude::*;

use crate::router::session::UserSession;

use super::Page;

pub fn login_successful(
    user: UserSession,
    admin_url: Option<String>,
    logout_url: String,
) -> Page<'static> {
    let display_name = user.display_name();
    let username = user.username;
    let email = user.email.unwrap_or_else(|| "no email on record".to_string());
    let groups = user.groups;

    Page {
        title: rsx! { "Login successful" },
        head: None,
        content: rsx! {
            h1 { "Login successful" }
            p { "welcome, {display_name}" }

            dl {
                dt { "username" }
                dd { code { username } }
                dt { "email" }
                dd { email }
                dt { "groups" }
                dd {
                    ul {
                        groups.iter().map(|group| rsx! {
                            li { "{group}" }
                        })
                    }
                }
            }

            menu {
                if let Some(admin_url) = admin_url {
                    rsx! {
                        li {
                            a { href: "{admin_url}", "administration" }
                        }
                    }
                }
                li {
                    a { href: "{logout_url}", "log out" }
                }
            }
        },
    }
}
