use std::{net::SocketAddr, sync::Arc};

use adf_portal::{
    adfs::{AdfsProvider, ProviderConfiguration},
    router::{app, session::UserSession, AppState},
    AdfsEnvironment,
};
use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use axum_extra::extract::{cookie::Key, PrivateCookieJar};
use jsonwebtoken::{jwk::JwkSet, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tower::ServiceExt;
use url::Url;

const DOMAIN: &str = "portal.example.test";
const SIGNING_KEY: &[u8] = include_bytes!("fixtures/signing-key.pem");
const SIGNING_JWK: &str = include_str!("fixtures/signing-key.jwk.json");

fn environment() -> AdfsEnvironment {
    AdfsEnvironment {
        server: "adfs.example.test".to_string(),
        client_id: "portal".to_string(),
        client_secret: None,
        relying_party_id: "portal".to_string(),
        audience: "microsoft:identityserver:portal".to_string(),
        redirect_uri: "https://portal.example.test/oauth2/callback"
            .parse()
            .unwrap(),
        username_claim: "winaccountname".to_string(),
        groups_claim: "group".to_string(),
        admin_groups: vec!["Portal Admins".to_string()],
    }
}

fn configuration() -> ProviderConfiguration {
    ProviderConfiguration {
        metadata: serde_json::from_value(json!({
            "issuer": "https://adfs.example.test/adfs",
            "authorization_endpoint": "https://adfs.example.test/adfs/oauth2/authorize/",
            "token_endpoint": "https://adfs.example.test/adfs/oauth2/token/",
            "jwks_uri": "https://adfs.example.test/adfs/discovery/keys",
            "end_session_endpoint": "https://adfs.example.test/adfs/oauth2/logout"
        }))
        .unwrap(),
        keys: JwkSet {
            keys: vec![serde_json::from_str(SIGNING_JWK).unwrap()],
        },
    }
}

fn test_app(key: &Key) -> Router {
    test_app_with(key, configuration())
}

fn test_app_with(key: &Key, configuration: ProviderConfiguration) -> Router {
    let state = AppState {
        key: key.clone(),
        adfs: Arc::new(AdfsProvider::with_configuration(
            environment(),
            configuration,
        )),
    };

    app(DOMAIN.parse().unwrap(), state).expect("failed to build app")
}

fn user(is_staff: bool) -> UserSession {
    UserSession {
        username: "jdoe".to_string(),
        email: Some("jdoe@example.test".to_string()),
        first_name: Some("Jane".to_string()),
        last_name: Some("Doe".to_string()),
        groups: if is_staff {
            vec!["Portal Admins".to_string()]
        } else {
            vec!["Domain Users".to_string()]
        },
        is_staff,
    }
}

/// `name=value` pair of an encrypted session cookie for `user`
fn session_cookie(key: &Key, user: UserSession) -> String {
    let response = PrivateCookieJar::new(key.clone())
        .add(user.into_cookie().unwrap())
        .into_response();

    set_cookies(&response)
        .into_iter()
        .next()
        .expect("missing Set-Cookie header")
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::builder()
        .uri(uri)
        .header(header::HOST, DOMAIN);

    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }

    request.body(Body::empty()).unwrap()
}

fn location<B>(response: &Response<B>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .expect("invalid Location header")
}

fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// `name=value` pair of the cookie called `name` set by `response`
fn cookie_pair<B>(response: &Response<B>, name: &str) -> String {
    set_cookies(response)
        .into_iter()
        .find(|cookie| cookie.starts_with(&format!("{name}=")))
        .expect("missing cookie")
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn access_token(username: &str) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("adfs-signing".to_string());

    jsonwebtoken::encode(
        &header,
        &json!({
            "aud": "microsoft:identityserver:portal",
            "iss": "https://adfs.example.test/adfs",
            "nbf": now,
            "exp": now + 3600,
            "winaccountname": username,
            "group": ["Portal Admins"]
        }),
        &EncodingKey::from_rsa_pem(SIGNING_KEY).unwrap(),
    )
    .unwrap()
}

/// Serve a canned token endpoint response on a local port
async fn token_endpoint(status: StatusCode, body: Value) -> SocketAddr {
    let stub = Router::new().route(
        "/adfs/oauth2/token/",
        post(move || async move { (status, Json(body)) }),
    );

    let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
        .serve(stub.into_make_service());
    let address = server.local_addr();
    tokio::spawn(server);

    address
}

fn configuration_with_token_endpoint(address: SocketAddr) -> ProviderConfiguration {
    let mut configuration = configuration();
    configuration.metadata.token_endpoint = format!("http://{address}/adfs/oauth2/token/")
        .parse()
        .unwrap();
    configuration
}

/// Start a login and return the `state` sent to ADFS along with the login
/// state cookie
async fn start_login(app: Router, next: &str) -> (String, String) {
    let response = app
        .oneshot(get(&format!("/oauth2/login?next={next}"), None))
        .await
        .unwrap();

    let state = Url::parse(location(&response))
        .unwrap()
        .query_pairs()
        .find(|(name, _)| name == "state")
        .map(|(_, value)| value.into_owned())
        .expect("missing state parameter");

    (state, cookie_pair(&response, "adf-login-state"))
}

async fn body_text<B>(response: Response<B>) -> String
where
    B: hyper::body::HttpBody,
    B::Error: std::fmt::Debug,
{
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn root_requires_login() {
    let key = Key::generate();

    let response = test_app(&key).oneshot(get("/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/oauth2/login?next=%2F");
}

#[tokio::test]
async fn root_greets_signed_in_user() {
    let key = Key::generate();
    let cookie = session_cookie(&key, user(false));

    let response = test_app(&key)
        .oneshot(get("/", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Login successful"));
    assert!(body.contains("Jane Doe"));
    assert!(!body.contains("/admin/"));
}

#[tokio::test]
async fn admin_redirects_anonymous_users_to_login() {
    let key = Key::generate();

    let response = test_app(&key).oneshot(get("/admin/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/login/?next=%2Fadmin%2F");
}

#[tokio::test]
async fn admin_login_delegates_to_adfs() {
    let key = Key::generate();

    let response = test_app(&key)
        .oneshot(get("/admin/login/?next=%2Fadmin%2F", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/oauth2/login?next=%2Fadmin%2F");
}

#[tokio::test]
async fn admin_rejects_non_staff() {
    let key = Key::generate();
    let cookie = session_cookie(&key, user(false));

    let response = test_app(&key)
        .oneshot(get("/admin/", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_lists_routes_for_staff() {
    let key = Key::generate();
    let cookie = session_cookie(&key, user(true));

    let response = test_app(&key)
        .oneshot(get("/admin/", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Site administration"));
    assert!(body.contains("/sentry-debug/"));
    assert!(body.contains("login-view"));
}

#[tokio::test]
async fn missing_trailing_slash_is_redirected() {
    let key = Key::generate();

    let response = test_app(&key).oneshot(get("/admin", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "/admin/");
}

#[tokio::test]
async fn oauth2_login_redirects_to_adfs() {
    let key = Key::generate();

    let response = test_app(&key)
        .oneshot(get("/oauth2/login?next=%2Fadmin%2F", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response)
        .starts_with("https://adfs.example.test/adfs/oauth2/authorize/?response_type=code"));
    assert!(set_cookies(&response)
        .iter()
        .any(|cookie| cookie.starts_with("adf-login-state=")));
}

#[tokio::test]
async fn callback_without_login_state_is_rejected() {
    let key = Key::generate();

    let response = test_app(&key)
        .oneshot(get("/oauth2/callback?code=abc&state=xyz", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_reports_adfs_errors() {
    let key = Key::generate();

    let response = test_app(&key)
        .oneshot(get(
            "/oauth2/callback?error=access_denied&error_description=MSIS9605",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("access_denied"));
}

#[tokio::test]
async fn logout_ends_both_sessions() {
    let key = Key::generate();
    let cookie = session_cookie(&key, user(false));

    let response = test_app(&key)
        .oneshot(get("/oauth2/logout", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "https://adfs.example.test/adfs/oauth2/logout"
    );
    assert!(set_cookies(&response)
        .iter()
        .any(|cookie| cookie.starts_with("adf-session=;")));
}

#[tokio::test]
async fn sentry_debug_fails() {
    let key = Key::generate();

    let response = test_app(&key)
        .oneshot(get("/sentry-debug/", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let key = Key::generate();

    let response = test_app(&key)
        .oneshot(get("/wp-login.php", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_hosts_are_redirected_to_the_domain() {
    let key = Key::generate();

    let request = Request::builder()
        .uri("/admin/?page=2")
        .header(header::HOST, "www.portal.example.test")
        .body(Body::empty())
        .unwrap();

    let response = test_app(&key).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert!(location(&response).ends_with("://portal.example.test/admin/?page=2"));
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let key = Key::generate();

    let response = test_app(&key).oneshot(get("/", None)).await.unwrap();

    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-origin-server"));
}

#[tokio::test]
async fn unknown_admin_paths_stay_in_the_admin_site() {
    let key = Key::generate();

    let response = test_app(&key)
        .oneshot(get("/admin/auth/user/?o=1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "/admin/login/?next=%2Fadmin%2Fauth%2Fuser%2F%3Fo%3D1"
    );

    let staff = session_cookie(&key, user(true));
    let response = test_app(&key)
        .oneshot(get("/admin/auth/user/", Some(&staff)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let other = session_cookie(&key, user(false));
    let response = test_app(&key)
        .oneshot(get("/admin/auth/user/", Some(&other)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_views_still_get_their_trailing_slash() {
    let key = Key::generate();

    let response = test_app(&key)
        .oneshot(get("/admin/login?next=%2Fadmin%2F", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "/admin/login/?next=%2Fadmin%2F");
}

#[tokio::test]
async fn callback_signs_the_user_in() {
    let address = token_endpoint(
        StatusCode::OK,
        json!({ "access_token": access_token("jdoe"), "token_type": "bearer" }),
    )
    .await;
    let key = Key::generate();
    let app = || test_app_with(&key, configuration_with_token_endpoint(address));

    let (state, login_state) = start_login(app(), "%2Fadmin%2F").await;

    let response = app()
        .oneshot(get(
            &format!("/oauth2/callback?code=good-code&state={state}"),
            Some(&login_state),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/");

    let cookies = set_cookies(&response);
    assert!(cookies
        .iter()
        .any(|cookie| cookie.starts_with("adf-login-state=;")));

    let session = cookie_pair(&response, "adf-session");
    assert_ne!(session, "adf-session=");

    // The new session is good enough for the staff only admin index
    let response = app()
        .oneshot(get("/admin/", Some(&session)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn refused_authorization_codes_are_forbidden() {
    let address = token_endpoint(
        StatusCode::BAD_REQUEST,
        json!({ "error": "invalid_grant", "error_description": "MSIS9612" }),
    )
    .await;
    let key = Key::generate();
    let app = || test_app_with(&key, configuration_with_token_endpoint(address));

    let (state, login_state) = start_login(app(), "%2F").await;

    let response = app()
        .oneshot(get(
            &format!("/oauth2/callback?code=stale-code&state={state}"),
            Some(&login_state),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!set_cookies(&response)
        .iter()
        .any(|cookie| cookie.starts_with("adf-session=")));
}
