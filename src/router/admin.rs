//! Minimal site administration, mounted under `admin/`. Signing in is
//! delegated to ADFS and only staff may see the index.

use axum::{
    extract::Query,
    http::Uri,
    response::{IntoResponse, Redirect, Response},
    routing::{any, get},
    Extension,
};
use tracing::debug;

use super::{
    authentication::{with_next, NextQuery},
    dispatch::Urls,
    session::UserSession,
    table::{Endpoint, Route, RouteTable, RouteTableError},
    AppState,
};
use crate::pages::{self, Forbidden, InternalServerError};

pub fn urls(state: &AppState) -> Result<RouteTable, RouteTableError> {
    RouteTable::new(vec![
        Route::view("", Endpoint::new(get(index).with_state(state.clone()))).name("index"),
        Route::view("login/", Endpoint::new(get(login))).name("login"),
        Route::view("logout/", Endpoint::new(get(logout))).name("logout"),
        // Keeps every other path under the prefix inside the admin site
        Route::prefix("", Endpoint::new(any(catch_all).with_state(state.clone()))),
    ])
}

/// The signed in staff user, or the response to send everyone else: a
/// redirect to the admin login for anonymous users and 403 otherwise
fn staff_only(urls: &Urls, user: Option<UserSession>, next: &str) -> Result<UserSession, Response> {
    let Some(user) = user else {
        return Err(match urls.url("admin:login") {
            Ok(login) => Redirect::to(&with_next(&login, next)).into_response(),
            Err(error) => InternalServerError::from(error).into_response(),
        });
    };

    if !user.is_staff {
        debug!(username = %user.username, "non staff user tried to open the admin site");

        return Err(
            Forbidden::new("you do not have permission to view the site administration")
                .into_response(),
        );
    }

    Ok(user)
}

pub async fn index(
    Extension(urls): Extension<Urls>,
    user: Option<UserSession>,
) -> Result<Response, InternalServerError> {
    let user = match staff_only(&urls, user, &urls.url("admin:index")?) {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let logout = urls.url("admin:logout")?;
    Ok(pages::admin_index(user, urls.patterns(), logout).into_response())
}

/// Any other path under the admin prefix. Staff get a 404 from the admin.
pub async fn catch_all(
    Extension(urls): Extension<Urls>,
    user: Option<UserSession>,
    uri: Uri,
) -> Response {
    let next = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);

    match staff_only(&urls, user, &next) {
        Ok(_) => pages::not_found(uri.path()),
        Err(response) => response,
    }
}

pub async fn login(
    Extension(urls): Extension<Urls>,
    Query(query): Query<NextQuery>,
) -> Result<Redirect, InternalServerError> {
    let next = match query.safe_next() {
        Some(next) => next,
        None => urls.url("admin:index")?,
    };

    Ok(Redirect::to(&with_next(
        &urls.url("django_auth_adfs:login")?,
        &next,
    )))
}

pub async fn logout(Extension(urls): Extension<Urls>) -> Result<Redirect, InternalServerError> {
    Ok(Redirect::to(&urls.url("django_auth_adfs:logout")?))
}
