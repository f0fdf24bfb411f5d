//! OpenID Connect client for Active Directory Federation Services.

use jsonwebtoken::{jwk::JwkSet, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, trace};
use url::Url;

use crate::{environment::AdfsEnvironment, router::session::UserSession};

pub type Claims = Map<String, Value>;

#[derive(Debug, Error)]
pub enum AdfsError {
    #[error("failed to load the ADFS provider configuration: {0}")]
    Configuration(#[source] reqwest::Error),
    #[error("failed to exchange the authorization code: {0}")]
    TokenExchange(#[source] reqwest::Error),
    #[error("access token was rejected: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("no signing key matches the access token key id {0:?}")]
    UnknownSigningKey(Option<String>),
    #[error("claim `{0}` is missing from the access token")]
    MissingClaim(String),
}

/// The parts of `/.well-known/openid-configuration` we make use of
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    /// ADFS signs access tokens with a different issuer than id tokens
    #[serde(default)]
    pub access_token_issuer: Option<String>,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub jwks_uri: Url,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct ProviderConfiguration {
    pub metadata: ProviderMetadata,
    pub keys: JwkSet,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug)]
pub struct AdfsProvider {
    environment: AdfsEnvironment,
    client: reqwest::Client,
    configuration: OnceCell<ProviderConfiguration>,
}

impl AdfsProvider {
    pub fn new(environment: AdfsEnvironment) -> Self {
        Self {
            environment,
            client: reqwest::Client::new(),
            configuration: OnceCell::new(),
        }
    }

    /// Provider that skips discovery and uses the given configuration
    pub fn with_configuration(
        environment: AdfsEnvironment,
        configuration: ProviderConfiguration,
    ) -> Self {
        Self {
            environment,
            client: reqwest::Client::new(),
            configuration: OnceCell::new_with(Some(configuration)),
        }
    }

    pub fn environment(&self) -> &AdfsEnvironment {
        &self.environment
    }

    /// Discovered on first use and cached for the lifetime of the process.
    /// A failed discovery is retried by the next caller.
    pub async fn configuration(&self) -> Result<&ProviderConfiguration, AdfsError> {
        self.configuration
            .get_or_try_init(|| self.discover())
            .await
    }

    #[tracing::instrument(skip(self), fields(server = %self.environment.server), err)]
    async fn discover(&self) -> Result<ProviderConfiguration, AdfsError> {
        let url = self.environment.discovery_url();

        info!(%url, "loading ADFS provider metadata");
        let metadata: ProviderMetadata = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(AdfsError::Configuration)?
            .json()
            .await
            .map_err(AdfsError::Configuration)?;

        trace!(jwks_uri = %metadata.jwks_uri, "loading ADFS signing keys");
        let keys: JwkSet = self
            .client
            .get(metadata.jwks_uri.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(AdfsError::Configuration)?
            .json()
            .await
            .map_err(AdfsError::Configuration)?;

        debug!(keys = keys.keys.len(), "loaded ADFS provider configuration");

        Ok(ProviderConfiguration { metadata, keys })
    }

    pub async fn authorization_url(&self, state: &str) -> Result<Url, AdfsError> {
        let configuration = self.configuration().await?;

        let mut url = configuration.metadata.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.environment.client_id)
            .append_pair("resource", &self.environment.relying_party_id)
            .append_pair("redirect_uri", self.environment.redirect_uri.as_str())
            .append_pair("state", state)
            .append_pair("scope", "openid");

        Ok(url)
    }

    /// Where to send the user agent to end the ADFS session as well
    pub async fn end_session_url(&self) -> Option<Url> {
        match self.configuration().await {
            Ok(configuration) => configuration.metadata.end_session_endpoint.clone(),
            Err(error) => {
                debug!(%error, "skipping ADFS single sign out");
                None
            }
        }
    }

    #[tracing::instrument(skip_all, err)]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AdfsError> {
        let configuration = self.configuration().await?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.environment.client_id.as_str()),
            ("redirect_uri", self.environment.redirect_uri.as_str()),
            ("code", code),
        ];
        if let Some(secret) = &self.environment.client_secret {
            form.push(("client_secret", secret.expose_secret().as_str()));
        }

        self.client
            .post(configuration.metadata.token_endpoint.clone())
            .form(&form)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(AdfsError::TokenExchange)?
            .json()
            .await
            .map_err(AdfsError::TokenExchange)
    }

    #[tracing::instrument(skip_all, err)]
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AdfsError> {
        let configuration = self.configuration().await?;
        let header = jsonwebtoken::decode_header(token)?;

        let jwk = match &header.kid {
            Some(kid) => configuration.keys.find(kid),
            None => configuration.keys.keys.first(),
        }
        .ok_or_else(|| AdfsError::UnknownSigningKey(header.kid.clone()))?;

        let issuer = configuration
            .metadata
            .access_token_issuer
            .as_deref()
            .unwrap_or(&configuration.metadata.issuer);

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.environment.audience]);
        validation.set_issuer(&[issuer]);
        validation.validate_nbf = true;

        let data =
            jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_jwk(jwk)?, &validation)?;

        Ok(data.claims)
    }

    pub fn user_from_claims(&self, claims: &Claims) -> Result<UserSession, AdfsError> {
        user_from_claims(&self.environment, claims)
    }
}

fn string_claim(claims: &Claims, name: &str) -> Option<String> {
    claims.get(name).and_then(Value::as_str).map(String::from)
}

/// Map access token claims onto a user. Groups may be a single string or a
/// list of strings.
pub fn user_from_claims(
    environment: &AdfsEnvironment,
    claims: &Claims,
) -> Result<UserSession, AdfsError> {
    let username = string_claim(claims, &environment.username_claim)
        .ok_or_else(|| AdfsError::MissingClaim(environment.username_claim.clone()))?;

    let groups: Vec<String> = match claims.get(&environment.groups_claim) {
        Some(Value::String(group)) => vec![group.clone()],
        Some(Value::Array(groups)) => groups
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    };

    let is_staff = groups
        .iter()
        .any(|group| environment.admin_groups.contains(group));

    Ok(UserSession {
        username,
        email: string_claim(claims, "email"),
        first_name: string_claim(claims, "given_name"),
        last_name: string_claim(claims, "family_name"),
        groups,
        is_staff,
    })
}
