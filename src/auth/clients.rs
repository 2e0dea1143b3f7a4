use std::fmt;

use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;

use crate::{AppError, AppResult};

type HappyClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What an identity provider tells us about the signed-in person.
#[derive(Debug, Clone)]
pub struct OauthIdentity {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Deserialize)]
struct SecretEntry {
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize, Default)]
struct SecretsFile {
    google: Option<SecretEntry>,
    github: Option<SecretEntry>,
    redirect_base: Option<String>,
}

#[derive(Clone)]
pub struct Clients {
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

impl Clients {
    /// Social login disabled entirely; every get_client call fails.
    pub fn disabled() -> Clients {
        Clients { google_client: None, github_client: None }
    }

    pub fn from_path(path: &str) -> anyhow::Result<Clients> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Clients> {
        let secrets: SecretsFile = serde_json::from_str(raw)?;
        let base = secrets
            .redirect_base
            .unwrap_or_else(|| "http://localhost:8080".to_owned());

        let google_client = secrets.google.map(|entry| {
            build_client(
                entry,
                "https://accounts.google.com/o/oauth2/auth",
                "https://oauth2.googleapis.com/token",
                &format!("{base}/api/v1/auth/callback/google"),
            )
        });

        let github_client = secrets.github.map(|entry| {
            build_client(
                entry,
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
                &format!("{base}/api/v1/auth/callback/github"),
            )
        });

        Ok(Clients { google_client, github_client })
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }
        .ok_or_else(|| AppError::validation(format!("OAuth provider {provider} is not configured")))
    }

    pub fn scopes(provider: ClientProvider) -> &'static [&'static str] {
        use ClientProvider::*;
        match provider {
            Google => &["openid", "email", "profile"],
            Github => &["read:user", "user:email"],
        }
    }
}

fn build_client(entry: SecretEntry, auth_url: &str, token_url: &str, redirect_url: &str) -> HappyClient {
    BasicClient::new(ClientId::new(entry.client_id))
        .set_client_secret(ClientSecret::new(entry.client_secret))
        .set_auth_uri(AuthUrl::new(auth_url.to_owned()).expect("static auth url"))
        .set_token_uri(TokenUrl::new(token_url.to_owned()).expect("static token url"))
        .set_redirect_uri(RedirectUrl::new(redirect_url.to_owned()).expect("static redirect url"))
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Deserialize)]
struct GithubUser {
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

/// Resolve the provider's notion of who just signed in.
pub async fn fetch_identity(
    http: &reqwest::Client,
    provider: ClientProvider,
    access_token: &str,
) -> AppResult<OauthIdentity> {
    match provider {
        ClientProvider::Google => {
            let info: GoogleUserInfo = http
                .get("https://openidconnect.googleapis.com/v1/userinfo")
                .bearer_auth(access_token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let email = info
                .email
                .ok_or_else(|| AppError::authentication("Google account is missing email"))?;

            Ok(OauthIdentity { email, name: info.name, picture: info.picture })
        }
        ClientProvider::Github => {
            let user: GithubUser = http
                .get("https://api.github.com/user")
                .bearer_auth(access_token)
                .header("User-Agent", "discuzz")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let email = user
                .email
                .ok_or_else(|| AppError::authentication("GitHub account has no visible email"))?;

            Ok(OauthIdentity {
                email,
                name: user.name.or(Some(user.login)),
                picture: user.avatar_url,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_provider_is_a_validation_error() {
        let clients = Clients::disabled();
        let err = clients.get_client(ClientProvider::Google).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn secrets_file_providers_are_optional() {
        let clients = Clients::from_json(r#"{"google": {"client_id": "id", "client_secret": "s"}}"#)
            .unwrap();
        assert!(clients.get_client(ClientProvider::Google).is_ok());
        assert!(clients.get_client(ClientProvider::Github).is_err());
    }
}
