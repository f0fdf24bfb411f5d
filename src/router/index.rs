use axum::{
    response::{IntoResponse, Redirect, Response},
    Extension,
};

use super::{authentication::with_next, dispatch::Urls, session::UserSession};
use crate::pages::{self, InternalServerError};

/// Landing page after a successful ADFS login. Anonymous users are sent to
/// log in first.
pub async fn login_successful(
    Extension(urls): Extension<Urls>,
    user: Option<UserSession>,
) -> Result<Response, InternalServerError> {
    let Some(user) = user else {
        let login = with_next(
            &urls.url("django_auth_adfs:login")?,
            &urls.url("login-view")?,
        );
        return Ok(Redirect::to(&login).into_response());
    };

    let admin_url = if user.is_staff {
        Some(urls.url("admin:index")?)
    } else {
        None
    };
    let logout_url = urls.url("django_auth_adfs:logout")?;

    Ok(pages::login_successful(user, admin_url, logout_url).into_response())
}
