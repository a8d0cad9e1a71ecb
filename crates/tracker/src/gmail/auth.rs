//! Gmail OAuth2 token handling
//!
//! `jobwatch login` runs the authorization code flow once, receiving the
//! redirect on a local port, and leaves a token file behind
//! (`gmail-token.json` in the config directory). Sync cycles only load that
//! token and refresh it when it is about to expire; they never prompt.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::GmailCredentials;
use crate::sync::Deadline;

/// Token file name in the config directory
pub const TOKEN_FILE: &str = "gmail-token.json";

/// Stored token data
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

impl StoredToken {
    /// Google omits the refresh token on refresh, so the previous one is carried over
    fn from_response(response: TokenResponse, previous_refresh: Option<&str>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_at: response
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
        }
    }

    /// Valid for at least another five minutes
    fn is_fresh(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at > chrono::Utc::now().timestamp() + 300)
    }
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Cached OAuth2 token for the Gmail API
pub struct GmailAuth {
    credentials: GmailCredentials,
    token_path: PathBuf,
    cached: Mutex<Option<StoredToken>>,
}

impl GmailAuth {
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// The tracker only reads mail
    const GMAIL_READONLY_SCOPE: &'static str = "https://www.googleapis.com/auth/gmail.readonly";

    /// Local ports tried for the OAuth redirect
    const CALLBACK_PORTS: RangeInclusive<u16> = 8080..=8090;

    /// Use the token file in the default config directory
    pub fn new(credentials: GmailCredentials) -> Result<Self> {
        let token_path =
            config::config_path(TOKEN_FILE).context("Could not determine config directory")?;
        Ok(Self::with_token_path(credentials, token_path))
    }

    pub fn with_token_path(credentials: GmailCredentials, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            token_path: token_path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Get a valid access token, refreshing it if needed
    ///
    /// A refresh is a remote call, so it is bounded by `deadline` and refused
    /// outright once the deadline has passed.
    pub fn get_access_token(&self, deadline: &Deadline) -> Result<String> {
        let mut cached = self.cached.lock().unwrap();

        if let Some(token) = cached.as_ref()
            && token.is_fresh()
        {
            return Ok(token.access_token.clone());
        }

        let token = self.load_token().with_context(|| {
            format!(
                "No usable Gmail token at {}; run `jobwatch login`",
                self.token_path.display()
            )
        })?;

        if token.is_fresh() {
            let access_token = token.access_token.clone();
            *cached = Some(token);
            return Ok(access_token);
        }

        let refresh_token = token
            .refresh_token
            .context("Gmail token expired and has no refresh token; log in again")?;

        debug!("Refreshing Gmail access token");
        let refreshed = self.refresh_access_token(&refresh_token, deadline)?;
        self.save_token(&refreshed)?;
        let access_token = refreshed.access_token.clone();
        *cached = Some(refreshed);
        Ok(access_token)
    }

    /// Check whether a token file exists and is fresh or refreshable
    pub fn is_authenticated(&self) -> bool {
        self.load_token()
            .map(|token| token.is_fresh() || token.refresh_token.is_some())
            .unwrap_or(false)
    }

    /// Run the interactive authorization code flow and store the resulting token
    ///
    /// Opens the consent page in a browser and blocks until Google redirects
    /// back to the local callback listener.
    pub fn login(&self) -> Result<()> {
        let (listener, port) = Self::bind_callback_listener()?;
        let redirect_uri = format!("http://localhost:{}", port);
        let auth_url = self.authorization_url(&redirect_uri);

        println!("Opening browser for Gmail authorization...");
        println!("If the browser doesn't open, visit: {}", auth_url);
        if let Err(e) = open::that(&auth_url) {
            warn!("Failed to open browser: {}", e);
        }

        let code = Self::wait_for_callback(listener)?;

        debug!("Exchanging authorization code for tokens");
        let response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("code", code.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .context("Failed to exchange authorization code")?;

        let response: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse token response")?;

        let token = StoredToken::from_response(response, None);
        if token.refresh_token.is_none() {
            warn!("Google returned no refresh token; the login will expire within the hour");
        }
        self.save_token(&token)?;
        *self.cached.lock().unwrap() = Some(token);

        info!("Gmail token saved to {}", self.token_path.display());
        Ok(())
    }

    /// Forget the stored token
    pub fn logout(&self) -> Result<()> {
        *self.cached.lock().unwrap() = None;
        if self.token_path.exists() {
            fs::remove_file(&self.token_path).with_context(|| {
                format!("Failed to remove {}", self.token_path.display())
            })?;
        }
        Ok(())
    }

    fn authorization_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(Self::GMAIL_READONLY_SCOPE),
        )
    }

    fn bind_callback_listener() -> Result<(TcpListener, u16)> {
        for port in Self::CALLBACK_PORTS {
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
                return Ok((listener, port));
            }
        }
        bail!(
            "Could not bind a callback port in {}-{}",
            Self::CALLBACK_PORTS.start(),
            Self::CALLBACK_PORTS.end()
        )
    }

    /// Accept the single redirect request and answer the browser
    fn wait_for_callback(listener: TcpListener) -> Result<String> {
        let (mut stream, _) = listener.accept().context("Failed to accept callback")?;

        let mut request_line = String::new();
        BufReader::new(&stream)
            .read_line(&mut request_line)
            .context("Failed to read callback request")?;

        let code = parse_callback(&request_line);
        let (status, body) = match &code {
            Ok(_) => ("200 OK", "Gmail access granted. You can close this window."),
            Err(_) => ("400 Bad Request", "Gmail authorization failed."),
        };
        let reply = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
            status, body
        );
        if let Err(e) = stream.write_all(reply.as_bytes()) {
            warn!("Failed to answer the OAuth callback: {}", e);
        }

        code
    }

    /// Refresh an access token using a refresh token
    fn refresh_access_token(&self, refresh_token: &str, deadline: &Deadline) -> Result<StoredToken> {
        let Some(timeout) = deadline.remaining() else {
            bail!("Sync deadline passed before the Gmail token could be refreshed");
        };

        let response = ureq::post(Self::TOKEN_URL)
            .config()
            .timeout_global(Some(timeout))
            .build()
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let response: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")?;

        Ok(StoredToken::from_response(response, Some(refresh_token)))
    }

    /// Load stored token from disk
    fn load_token(&self) -> Result<StoredToken> {
        let content = fs::read_to_string(&self.token_path)?;
        let token: StoredToken = serde_json::from_str(&content)?;
        Ok(token)
    }

    /// Save token to disk
    fn save_token(&self, token: &StoredToken) -> Result<()> {
        config::save_json_file(&self.token_path, token)
    }
}

/// Pull the authorization code out of the redirect's request line
///
/// `GET /?code=4%2F0Ab...&scope=... HTTP/1.1`
fn parse_callback(request_line: &str) -> Result<String> {
    let query = request_line
        .split_whitespace()
        .nth(1)
        .and_then(|target| target.split_once('?'))
        .map(|(_, query)| query)
        .unwrap_or_default();

    let mut code = None;
    for (key, value) in query.split('&').filter_map(|pair| pair.split_once('=')) {
        match key {
            "code" => code = Some(urlencoding::decode(value)?.into_owned()),
            "error" => bail!("Google rejected the authorization: {}", value),
            _ => {}
        }
    }

    code.context("No authorization code in the callback")
}
