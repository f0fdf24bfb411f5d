//! The site's URL configuration

use axum::routing::{any, get};

use crate::router::{
    admin, authentication, debug, index,
    table::{Endpoint, Route, RouteTable, RouteTableError},
    AppState,
};

/// Every route the site serves, tried in order
pub fn url_patterns(state: &AppState) -> Result<RouteTable, RouteTableError> {
    RouteTable::new(vec![
        Route::include("admin/", admin::urls(state)?).namespace("admin"),
        Route::view(
            "",
            Endpoint::new(get(index::login_successful).with_state(state.clone())),
        )
        .name("login-view"),
        Route::include("oauth2/", authentication::adfs::urls(state)?)
            .namespace("django_auth_adfs"),
        Route::view("sentry-debug/", Endpoint::new(any(debug::trigger_error))),
    ])
}
