//! Authorization code flow against an ADFS server, mounted under `oauth2/`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension,
};
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::NextQuery;
use crate::{
    adfs::{AdfsError, AdfsProvider},
    pages::{ClientError, Forbidden, InternalServerError},
    router::{
        dispatch::{NoReverseMatch, Urls},
        session::{LoginState, UserSession},
        table::{Endpoint, Route, RouteTable, RouteTableError},
        AppState,
    },
};

pub fn urls(state: &AppState) -> Result<RouteTable, RouteTableError> {
    RouteTable::new(vec![
        Route::view("login", Endpoint::new(get(login).with_state(state.clone()))).name("login"),
        Route::view(
            "callback",
            Endpoint::new(get(callback).with_state(state.clone())),
        )
        .name("callback"),
        Route::view("logout", Endpoint::new(get(logout).with_state(state.clone()))).name("logout"),
    ])
}

/// What ADFS sends back to the redirect URI
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CallbackQuery {
    Failure {
        error: String,
        error_description: Option<String>,
    },
    Success {
        code: String,
        state: String,
    },
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("ADFS did not authenticate the user: {error}")]
    Provider {
        error: String,
        description: Option<String>,
    },
    #[error("the callback did not include an authorization code")]
    MissingCode,
    #[error("the login state does not match the one this browser started with")]
    StateMismatch,
    #[error(transparent)]
    Adfs(#[from] AdfsError),
    #[error("failed to serialize cookie")]
    Cookie(#[from] serde_json::Error),
    #[error(transparent)]
    Reverse(#[from] NoReverseMatch),
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        match self {
            LoginError::Provider {
                ref error,
                ref description,
            } => {
                debug!(?error, ?description, "ADFS reported a failed login");

                ClientError::new(match description {
                    Some(description) => format!("{self} ({description})"),
                    None => self.to_string(),
                })
                .into_response()
            }
            LoginError::MissingCode | LoginError::StateMismatch => {
                debug!(error = %self, "rejected login callback");

                ClientError::new(self.to_string()).into_response()
            }
            LoginError::Adfs(
                AdfsError::InvalidToken(_)
                | AdfsError::UnknownSigningKey(_)
                | AdfsError::MissingClaim(_),
            ) => {
                warn!(error = %self, "ADFS access token was not accepted");

                Forbidden::new("the access token issued by ADFS was not accepted").into_response()
            }
            LoginError::Adfs(AdfsError::TokenExchange(ref error))
                if error.status().is_some_and(|status| status.is_client_error()) =>
            {
                warn!(error = %self, "ADFS refused the authorization code");

                Forbidden::new("ADFS refused the authorization code").into_response()
            }
            error => InternalServerError::from(error).into_response(),
        }
    }
}

/// Start a login, remembering where to go afterwards
#[tracing::instrument(skip_all)]
pub async fn login(
    State(adfs): State<Arc<AdfsProvider>>,
    cookies: PrivateCookieJar,
    Query(query): Query<NextQuery>,
) -> Result<(PrivateCookieJar, Redirect), LoginError> {
    let state = LoginState {
        state: Uuid::new_v4().to_string(),
        next: query.safe_next(),
    };

    let authorization_url = adfs.authorization_url(&state.state).await?;
    trace!(next = ?state.next, "redirecting to ADFS");

    Ok((
        cookies.add(state.into_cookie()?),
        Redirect::to(authorization_url.as_str()),
    ))
}

/// Finish a login, exchanging the authorization code for a session
#[tracing::instrument(skip_all)]
pub async fn callback(
    State(adfs): State<Arc<AdfsProvider>>,
    Extension(urls): Extension<Urls>,
    cookies: PrivateCookieJar,
    query: Option<Query<CallbackQuery>>,
) -> Result<(PrivateCookieJar, Redirect), LoginError> {
    let (code, state) = match query {
        Some(Query(CallbackQuery::Success { code, state })) => (code, state),
        Some(Query(CallbackQuery::Failure {
            error,
            error_description,
        })) => {
            return Err(LoginError::Provider {
                error,
                description: error_description,
            })
        }
        None => return Err(LoginError::MissingCode),
    };

    let login_state = LoginState::from_jar(&cookies)
        .filter(|login_state| login_state.state == state)
        .ok_or(LoginError::StateMismatch)?;

    let token = adfs.exchange_code(&code).await?;
    let claims = adfs.validate_token(&token.access_token).await?;
    let user = adfs.user_from_claims(&claims)?;

    info!(username = %user.username, is_staff = user.is_staff, "user logged in");

    let next = match login_state.next {
        Some(next) => next,
        None => urls.url("login-view")?,
    };

    Ok((
        cookies
            .remove(LoginState::removal())
            .add(user.into_cookie()?),
        Redirect::to(&next),
    ))
}

/// Drop the local session and end the ADFS session as well when the server
/// advertises how to.
#[tracing::instrument(skip_all)]
pub async fn logout(
    State(adfs): State<Arc<AdfsProvider>>,
    cookies: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    let location = match adfs.end_session_url().await {
        Some(url) => url.to_string(),
        None => "/".to_string(),
    };

    (cookies.remove(UserSession::removal()), Redirect::to(&location))
}
