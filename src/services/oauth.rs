use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;

/// What an external login yields: enough to upsert a local user.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub provider: String,
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// OAuth code exchange behind a trait so login handlers can be tested
/// without a network.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity>;
}

#[derive(Deserialize)]
struct GitHubTokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GitHubProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl GitHubProvider {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
        }
    }

    /// The profile's public email can be absent; the emails endpoint
    /// always has the primary one. Unverified emails are rejected,
    /// they would let anyone claim the owner address.
    async fn primary_email(&self, access_token: &str) -> Result<Option<String>> {
        let emails: Vec<GitHubEmail> = self
            .http
            .get("https://api.github.com/user/emails")
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, "rust-image-backend")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }
}

#[async_trait]
impl IdentityProvider for GitHubProvider {
    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity> {
        let token: GitHubTokenResponse = self
            .http
            .post("https://github.com/login/oauth/access_token")
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("GitHub token response was not JSON")?;

        let access_token = token.access_token.ok_or_else(|| {
            anyhow!(
                "GitHub rejected the code: {}",
                token.error_description.unwrap_or_else(|| "unknown".to_string())
            )
        })?;

        let user: GitHubUser = self
            .http
            .get("https://api.github.com/user")
            .bearer_auth(&access_token)
            .header(reqwest::header::USER_AGENT, "rust-image-backend")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let email = match user.email.clone() {
            Some(email) => email,
            None => self
                .primary_email(&access_token)
                .await?
                .ok_or_else(|| anyhow!("GitHub account has no verified primary email"))?,
        };

        Ok(ExternalIdentity {
            provider: "github".to_string(),
            provider_id: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
            avatar_url: user.avatar_url,
        })
    }
}
