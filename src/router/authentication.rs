use serde::Deserialize;
use url::form_urlencoded;

pub mod adfs;

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

impl NextQuery {
    /// The requested redirect target, if it stays on this site
    pub fn safe_next(self) -> Option<String> {
        self.next.filter(|next| is_safe_next(next))
    }
}

/// Only local absolute paths are followed after logging in
pub fn is_safe_next(next: &str) -> bool {
    next.starts_with('/') && !next.starts_with("//") && !next.starts_with("/\\")
}

/// `path` with a `next` query parameter appended
pub fn with_next(path: &str, next: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();

    format!("{path}?{query}")
}
