use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::Duration;
use tracing::debug;

const SESSION_COOKIE: &str = "adf-session";
const LOGIN_STATE_COOKIE: &str = "adf-login-state";

/// The signed in user, kept in an encrypted cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub groups: Vec<String>,
    pub is_staff: bool,
}

impl UserSession {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => self.username.clone(),
        }
    }

    pub fn into_cookie(self) -> Result<Cookie<'static>, serde_json::Error> {
        Ok(base_cookie(SESSION_COOKIE, serde_json::to_string(&self)?))
    }

    /// Cookie to hand to [`PrivateCookieJar::remove`] on logout
    pub fn removal() -> Cookie<'static> {
        base_cookie(SESSION_COOKIE, String::new())
    }
}

#[derive(Debug)]
pub enum UserSessionRejection {
    NoSessionCookie,
    BadSessionCookie(serde_json::Error),
}

impl IntoResponse for UserSessionRejection {
    fn into_response(self) -> axum::response::Response {
        match self {
            UserSessionRejection::NoSessionCookie => StatusCode::UNAUTHORIZED.into_response(),
            UserSessionRejection::BadSessionCookie(error) => {
                debug!(?error, "user has bad session cookie");

                StatusCode::BAD_REQUEST.into_response()
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UserSession
where
    Key: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = UserSessionRejection;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let cookies = private_cookies(parts, state).await;

        match read_cookie(&cookies, SESSION_COOKIE) {
            Some(session) => session.map_err(UserSessionRejection::BadSessionCookie),
            None => Err(UserSessionRejection::NoSessionCookie),
        }
    }
}

/// Round trip state between the redirect to ADFS and the callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    pub state: String,
    pub next: Option<String>,
}

impl LoginState {
    pub fn from_jar(cookies: &PrivateCookieJar) -> Option<Self> {
        match read_cookie(cookies, LOGIN_STATE_COOKIE)? {
            Ok(state) => Some(state),
            Err(error) => {
                debug!(?error, "user has bad login state cookie");
                None
            }
        }
    }

    pub fn into_cookie(self) -> Result<Cookie<'static>, serde_json::Error> {
        let mut cookie = base_cookie(LOGIN_STATE_COOKIE, serde_json::to_string(&self)?);
        cookie.set_max_age(Duration::minutes(10));

        Ok(cookie)
    }

    pub fn removal() -> Cookie<'static> {
        base_cookie(LOGIN_STATE_COOKIE, String::new())
    }
}

fn base_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(true)
        .http_only(true)
        .finish()
}

fn read_cookie<T: DeserializeOwned>(
    cookies: &PrivateCookieJar,
    name: &str,
) -> Option<Result<T, serde_json::Error>> {
    cookies
        .get(name)
        .map(|cookie| serde_json::from_str(cookie.value()))
}

async fn private_cookies<S>(parts: &mut request::Parts, state: &S) -> PrivateCookieJar
where
    Key: FromRef<S>,
    S: Send + Sync,
{
    match PrivateCookieJar::<Key>::from_request_parts(parts, state).await {
        Ok(cookies) => cookies,
        Err(infallible) => match infallible {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first_name: Option<&str>, last_name: Option<&str>) -> UserSession {
        UserSession {
            username: "jdoe".to_string(),
            email: None,
            first_name: first_name.map(String::from),
            last_name: last_name.map(String::from),
            groups: Vec::new(),
            is_staff: false,
        }
    }

    #[test]
    fn display_name_falls_back_to_username() {
        assert_eq!(user(Some("Jane"), Some("Doe")).display_name(), "Jane Doe");
        assert_eq!(user(Some("Jane"), None).display_name(), "Jane");
        assert_eq!(user(None, None).display_name(), "jdoe");
    }

    #[test]
    fn session_survives_the_private_jar() {
        let key = Key::generate();
        let session = user(Some("Jane"), None);

        let cookies = PrivateCookieJar::new(key).add(session.clone().into_cookie().unwrap());

        let read: UserSession = read_cookie(&cookies, SESSION_COOKIE).unwrap().unwrap();
        assert_eq!(read, session);
        assert!(LoginState::from_jar(&cookies).is_none());
    }
}
