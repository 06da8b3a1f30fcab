//! OAuth 1.0a session for the official Twitter API.
//!
//! Requests are signed with HMAC-SHA1 using the application's consumer key
//! pair and the account's access token pair, the same scheme user-context
//! endpoints of API v1.1 require.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use log::{debug, info};
use percent_encoding::utf8_percent_encode;
use rand::{Rng, distributions::Alphanumeric};
use reqwest::{Client, Response, header::AUTHORIZATION};
use serde::Deserialize;
use sha1::Sha1;
use url::Url;

use crate::error::Error;
use crate::platform::{UNRESERVED, rebase};

type HmacSha1 = Hmac<Sha1>;

const VERIFY_CREDENTIALS_URL: &str =
    "https://api.twitter.com/1.1/account/verify_credentials.json";

/// Application and account secrets for user-context API access.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TwitterCredentials {
    pub api_key: String,
    pub api_key_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

/// Per-request values that must be fresh for every signature.
struct Stamp {
    nonce: String,
    timestamp: u64,
}

impl Stamp {
    fn now() -> Self {
        let nonce = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        Stamp { nonce, timestamp }
    }
}

#[derive(Deserialize)]
struct VerifiedUser {
    screen_name: String,
}

/// An authenticated client, verified once and reused for every lookup in a run.
#[derive(Debug, Clone)]
pub struct TwitterSession {
    client: Client,
    credentials: TwitterCredentials,
    origin: Option<Url>,
}

impl TwitterSession {
    /// Builds a session and verifies it against the API.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] when credentials are absent, the
    /// request cannot be sent or the API rejects them.
    pub async fn authenticate(
        client: Client,
        credentials: Option<&TwitterCredentials>,
    ) -> Result<Self, Error> {
        Self::authenticate_at(client, credentials, None).await
    }

    /// Like [`TwitterSession::authenticate`], sending every request to
    /// `origin` instead of the API host when one is given.
    ///
    /// # Errors
    ///
    /// See [`TwitterSession::authenticate`].
    pub async fn authenticate_at(
        client: Client,
        credentials: Option<&TwitterCredentials>,
        origin: Option<Url>,
    ) -> Result<Self, Error> {
        let credentials = credentials
            .cloned()
            .ok_or_else(|| Error::Authentication("credentials are not configured".into()))?;
        let session = TwitterSession {
            client,
            credentials,
            origin,
        };

        let resp = session
            .get(VERIFY_CREDENTIALS_URL)
            .await
            .map_err(|e| Error::Authentication(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Authentication(format!(
                "credentials rejected with HTTP {status}"
            )));
        }

        match resp.json::<VerifiedUser>().await {
            Ok(user) => info!("Authenticated with Twitter as @{}", user.screen_name),
            Err(e) => {
                debug!("Could not read verified Twitter user: {e}");
                info!("Authenticated with Twitter");
            }
        }

        Ok(session)
    }

    /// Sends a signed GET request.
    ///
    /// # Errors
    ///
    /// Fails when the URL is invalid or the request cannot be sent.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        let parsed = match &self.origin {
            Some(origin) => Url::parse(&rebase(url, origin)?)?,
            None => Url::parse(url)?,
        };
        let header = authorization_header("GET", &parsed, &self.credentials, &Stamp::now())?;
        self.client
            .get(parsed)
            .header(AUTHORIZATION, header)
            .send()
            .await
            .map_err(|e| Error::from_request(url, e))
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, UNRESERVED).to_string()
}

fn oauth_params(credentials: &TwitterCredentials, stamp: &Stamp) -> Vec<(String, String)> {
    vec![
        ("oauth_consumer_key".into(), credentials.api_key.clone()),
        ("oauth_nonce".into(), stamp.nonce.clone()),
        ("oauth_signature_method".into(), "HMAC-SHA1".into()),
        ("oauth_timestamp".into(), stamp.timestamp.to_string()),
        ("oauth_token".into(), credentials.access_token.clone()),
        ("oauth_version".into(), "1.0".into()),
    ]
}

/// Computes the HMAC-SHA1 signature over the request method, base URL and
/// every protocol and request parameter.
fn signature(
    method: &str,
    url: &Url,
    params: &[(String, String)],
    credentials: &TwitterCredentials,
) -> Result<String, Error> {
    let mut base_url = url.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);

    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();
    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(base_url.as_str()),
        encode(&param_string)
    );
    let key = format!(
        "{}&{}",
        encode(&credentials.api_key_secret),
        encode(&credentials.access_token_secret)
    );

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Authentication(format!("cannot sign request: {e}")))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn authorization_header(
    method: &str,
    url: &Url,
    credentials: &TwitterCredentials,
    stamp: &Stamp,
) -> Result<String, Error> {
    let mut oauth = oauth_params(credentials, stamp);
    let mut all = oauth.clone();
    all.extend(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())));
    oauth.push((
        "oauth_signature".into(),
        signature(method, url, &all, credentials)?,
    ));

    let fields = oauth
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {fields}"))
}
