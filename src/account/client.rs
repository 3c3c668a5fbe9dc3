use std::sync::Arc;

use log::{info, warn};
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::account::errors::AccountError;
use crate::config::{Config, Endpoints};

const SESSION_COOKIE: &str = "user_session";
const USER_AGENT: &str = concat!("kome/", env!("CARGO_PKG_VERSION"));

/// Cookie-bearing HTTP client for the logged-in viewer.
pub struct Account {
    client: Client,
    endpoints: Endpoints,
    session_pattern: Regex,
}

impl Account {
    pub fn new(session: Option<&str>, endpoints: Endpoints) -> Result<Self, AccountError> {
        let client = Self::client_with_session(session, &endpoints)?;

        Ok(Self {
            client,
            endpoints,
            session_pattern: Regex::new(r"^user_session_[0-9]+_[0-9a-f]{64}$")?,
        })
    }

    /// The authenticated client; cloning shares its connection pool and cookies.
    pub fn http(&self) -> Client {
        self.client.clone()
    }

    fn client_with_session(session: Option<&str>, endpoints: &Endpoints) -> Result<Client, AccountError> {
        let jar = Arc::new(Jar::default());
        if let Some(session) = session {
            let url = Url::parse(&endpoints.cookie_domain)?;
            let host = url.host_str().unwrap_or_default();
            jar.add_cookie_str(&format!("{}={}; Domain={}; Path=/", SESSION_COOKIE, session, host), &url);
        }

        Ok(Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(jar)
            .build()?)
    }

    /// `Ok(false)` when the platform reports the session as logged out.
    pub async fn heartbeat(&self) -> Result<bool, AccountError> {
        let body = self
            .client
            .get(&self.endpoints.heartbeat)
            .send()
            .await?
            .text()
            .await?;

        parse_heartbeat(&body)
    }

    /// Logs in with a fresh cookie jar and returns the new session value.
    pub async fn login(&mut self, mail: &str, password: &str) -> Result<String, AccountError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        let response = client
            .post(&self.endpoints.login)
            .form(&[("mail", mail), ("password", password)])
            .send()
            .await?;
        info!("Login response status: {}", response.status());

        let mut candidates = vec![Url::parse(&self.endpoints.cookie_domain)?];
        candidates.push(Url::parse(&self.endpoints.login)?);

        let session = candidates
            .iter()
            .filter_map(|url| jar.cookies(url))
            .filter_map(|header| header.to_str().ok().map(str::to_string))
            .find_map(|header| find_session_cookie(&header, &self.session_pattern))
            .ok_or(AccountError::LoginFailed)?;

        self.client = Self::client_with_session(Some(&session), &self.endpoints)?;
        Ok(session)
    }

    /// Reuses the persisted session, logging in again when it has expired.
    pub async fn ensure_session(&mut self, config: &mut Config) -> Result<(), AccountError> {
        if config.session.is_some() && self.heartbeat().await? {
            info!("Persisted session is still valid");
            return Ok(());
        }

        warn!("Session is missing or expired, logging in");
        let (mail, password) = match (&config.mail, &config.password) {
            (Some(mail), Some(password)) => (mail.clone(), password.clone()),
            _ => return Err(AccountError::MissingCredentials),
        };

        let session = self.login(&mail, &password).await?;
        if !self.heartbeat().await? {
            return Err(AccountError::NotLoggedIn);
        }

        config.set_session(session)?;
        info!("Logged in and saved new session");
        Ok(())
    }
}

/// Picks the session cookie out of a `Cookie` header value.
pub fn find_session_cookie(header: &str, pattern: &Regex) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && pattern.is_match(value))
        .map(|(_, value)| value.to_string())
}

#[derive(Debug, Deserialize)]
struct HeartbeatDocument {
    #[serde(default)]
    error: Option<HeartbeatError>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatError {
    #[serde(default)]
    code: String,
}

pub fn parse_heartbeat(body: &str) -> Result<bool, AccountError> {
    let doc: HeartbeatDocument =
        quick_xml::de::from_str(body).map_err(|e| AccountError::Parse(e.to_string()))?;

    Ok(!matches!(doc.error, Some(error) if error.code == "NOTLOGIN"))
}
