use std::{env, net::SocketAddr};

use axum::http::uri::Authority;
use axum_extra::extract::cookie::Key;
use color_eyre::{
    eyre::{eyre, Context},
    Help,
};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

fn var(name: &str) -> color_eyre::Result<String> {
    env::var(name).wrap_err_with(|| format!("${name} should be set"))
}

fn optional_var(name: &str) -> color_eyre::Result<Option<String>> {
    match env::var(name) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(error) => Err(error).wrap_err_with(|| format!("${name} should be valid unicode")),
    }
}

#[derive(Debug)]
pub struct HttpEnvironment {
    pub bind: SocketAddr,
    pub domain: Authority,
    pub secret_key: SecretString,
}

impl HttpEnvironment {
    pub fn from_env() -> color_eyre::Result<Self> {
        Ok(HttpEnvironment {
            bind: var("BIND")?
                .parse()
                .wrap_err("$BIND should be a valid SocketAddr")?,
            domain: var("DOMAIN")?
                .parse()
                .wrap_err("$DOMAIN should be a valid URI authority")?,
            secret_key: SecretString::new(var("SECRET_KEY")?),
        })
    }

    /// Key used to encrypt the private session cookies
    pub fn cookie_key(&self) -> color_eyre::Result<Key> {
        Key::try_from(self.secret_key.expose_secret().as_bytes())
            .wrap_err("$SECRET_KEY is not a valid cookie key")
            .note("the key must be at least 64 bytes long")
    }
}

#[derive(Debug)]
pub struct AdfsEnvironment {
    /// Host name of the ADFS server
    pub server: String,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub relying_party_id: String,
    /// Expected `aud` claim of access tokens
    pub audience: String,
    pub redirect_uri: Url,
    pub username_claim: String,
    pub groups_claim: String,
    /// Members of any of these groups get access to the admin site
    pub admin_groups: Vec<String>,
}

impl AdfsEnvironment {
    pub fn from_env() -> color_eyre::Result<Self> {
        let relying_party_id = var("ADFS_RELYING_PARTY_ID")?;

        let server = var("ADFS_SERVER")?;
        if server.contains('/') {
            return Err::<Self, _>(eyre!("$ADFS_SERVER should be a host name"))
                .warning("do not include the scheme or a path")
                .note(format!("got {server:?}"));
        }

        Ok(AdfsEnvironment {
            server,
            client_id: var("ADFS_CLIENT_ID")?,
            client_secret: optional_var("ADFS_CLIENT_SECRET")?.map(SecretString::new),
            audience: optional_var("ADFS_AUDIENCE")?
                .unwrap_or_else(|| format!("microsoft:identityserver:{relying_party_id}")),
            relying_party_id,
            redirect_uri: var("ADFS_REDIRECT_URI")?
                .parse()
                .wrap_err("$ADFS_REDIRECT_URI should be a valid absolute URL")?,
            username_claim: optional_var("ADFS_USERNAME_CLAIM")?
                .unwrap_or_else(|| "winaccountname".to_string()),
            groups_claim: optional_var("ADFS_GROUPS_CLAIM")?
                .unwrap_or_else(|| "group".to_string()),
            admin_groups: optional_var("ADFS_ADMIN_GROUPS")?
                .map(|groups| parse_list(&groups))
                .unwrap_or_default(),
        })
    }

    pub fn discovery_url(&self) -> String {
        format!(
            "https://{}/adfs/.well-known/openid-configuration",
            self.server
        )
    }
}

fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Default)]
pub struct SentryEnvironment {
    pub dsn: Option<sentry::types::Dsn>,
    pub environment: Option<String>,
}

impl SentryEnvironment {
    pub fn from_env() -> color_eyre::Result<Self> {
        Ok(SentryEnvironment {
            dsn: optional_var("SENTRY_DSN")?
                .map(|dsn| dsn.parse::<sentry::types::Dsn>())
                .transpose()
                .wrap_err("$SENTRY_DSN should be a valid DSN")?,
            environment: optional_var("SENTRY_ENVIRONMENT")?,
        })
    }
}
