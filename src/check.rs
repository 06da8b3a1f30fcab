//! Availability checkers, one strategy per kind of platform signal.

use async_trait::async_trait;
use log::{Level, error, info, log, trace};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::{fmt, sync::LazyLock};
use url::Url;

use crate::error::Error;
use crate::platform::{Platform, rebase};
use crate::twitter::TwitterSession;

static NEXT_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*\bid\s*=\s*["']__NEXT_DATA__["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

/// Outcome of probing a single handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckResult {
    /// No account holds the handle.
    Available,
    /// An account holds the handle.
    Taken,
    /// The probe failed or the response could not be interpreted.
    Unknown,
}

impl CheckResult {
    /// Classifies the status returned by a profile or lookup URL.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::NOT_FOUND => CheckResult::Available,
            StatusCode::OK => CheckResult::Taken,
            _ => CheckResult::Unknown,
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckResult::Available => write!(f, "available"),
            CheckResult::Taken => write!(f, "taken"),
            CheckResult::Unknown => write!(f, "unknown"),
        }
    }
}

/// Decides whether a handle is free on one platform.
#[async_trait]
pub trait Checker: Send + Sync {
    fn platform(&self) -> Platform;

    /// Never fails: every error degrades to [`CheckResult::Unknown`].
    async fn check(&self, handle: &str) -> CheckResult;
}

fn target(platform: Platform, handle: &str, origin: Option<&Url>) -> Result<String, Error> {
    let url = platform.probe_url(handle);
    match origin {
        Some(origin) => rebase(&url, origin),
        None => Ok(url),
    }
}

/// Level at which a failed probe is reported.
pub fn failure_level(platform: Platform, err: &Error) -> Level {
    if platform.ignores_timeouts() && err.is_timeout() {
        Level::Debug
    } else {
        Level::Error
    }
}

/// Maps a probe outcome to a result, logging it the way each case deserves.
pub fn classify_probe(
    platform: Platform,
    handle: &str,
    probe: Result<StatusCode, Error>,
) -> CheckResult {
    let shown = platform.display_handle(handle);
    match probe {
        Ok(status) => {
            let result = CheckResult::from_status(status);
            match result {
                CheckResult::Available => {
                    info!("{platform} {} {shown} is available", platform.handle_noun());
                }
                CheckResult::Taken => info!(
                    "Fetched {platform} user {shown}, {} is unavailable",
                    platform.handle_noun()
                ),
                CheckResult::Unknown => error!(
                    "Unexpected HTTP {status} while checking {platform} {} {shown}",
                    platform.handle_noun()
                ),
            }
            result
        }
        Err(e) => {
            match failure_level(platform, &e) {
                Level::Error => error!(
                    "Failed to determine availability of {platform} {} {shown}: {e}",
                    platform.handle_noun()
                ),
                level => log!(level, "Ignoring {platform} timeout for {shown}: {e}"),
            }
            CheckResult::Unknown
        }
    }
}

/// Checker for platforms that answer 404 for unregistered handles.
pub struct StatusChecker {
    platform: Platform,
    client: Client,
    origin: Option<Url>,
}

impl StatusChecker {
    /// The client's redirect policy must match [`Platform::follows_redirects`].
    pub fn new(platform: Platform, client: Client) -> Self {
        StatusChecker {
            platform,
            client,
            origin: None,
        }
    }

    /// Sends requests to `origin` instead of the platform's own host.
    #[must_use]
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    async fn probe(&self, handle: &str) -> Result<StatusCode, Error> {
        let url = target(self.platform, handle, self.origin.as_ref())?;
        let url = url.as_str();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::from_request(url, e))?;
        let status = resp.status();
        if log::log_enabled!(Level::Trace) {
            let final_url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            trace!("HTTP {status} GET {final_url}: {body}");
        }
        Ok(status)
    }
}

#[async_trait]
impl Checker for StatusChecker {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn check(&self, handle: &str) -> CheckResult {
        let probe = self.probe(handle).await;
        classify_probe(self.platform, handle, probe)
    }
}

/// Reads whether the profile timeline embedded in a syndication page has results.
///
/// # Errors
///
/// Fails when the body is empty, lacks the `__NEXT_DATA__` script, holds
/// malformed JSON or misses the `contextProvider` object.
pub fn parse_syndication(body: &str) -> Result<CheckResult, Error> {
    if body.trim().is_empty() {
        return Err(Error::UnexpectedResponse("response body is empty".into()));
    }

    let script = NEXT_DATA
        .captures(body)
        .and_then(|c| c.get(1))
        .ok_or_else(|| Error::UnexpectedResponse("__NEXT_DATA__ script not found".into()))?;
    trace!("{}", script.as_str());

    let data: Value = serde_json::from_str(script.as_str())?;
    let provider = data
        .pointer("/props/pageProps/contextProvider")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            Error::UnexpectedResponse("props.pageProps.contextProvider is missing".into())
        })?;

    // Suspended accounts have no results either, so they report as available.
    match provider.get("hasResults").and_then(Value::as_bool) {
        Some(true) => Ok(CheckResult::Taken),
        _ => Ok(CheckResult::Available),
    }
}

/// Checker for X backed by the unauthenticated syndication timeline.
pub struct SyndicationChecker {
    client: Client,
    origin: Option<Url>,
}

impl SyndicationChecker {
    pub fn new(client: Client) -> Self {
        SyndicationChecker {
            client,
            origin: None,
        }
    }

    /// Sends requests to `origin` instead of the syndication host.
    #[must_use]
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    async fn fetch(&self, handle: &str) -> Result<String, Error> {
        let url = target(Platform::X, handle, self.origin.as_ref())?;
        let url = url.as_str();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::from_request(url, e))?
            .error_for_status()?;
        let body = resp.text().await?;
        trace!("{body}");
        Ok(body)
    }
}

#[async_trait]
impl Checker for SyndicationChecker {
    fn platform(&self) -> Platform {
        Platform::X
    }

    async fn check(&self, handle: &str) -> CheckResult {
        let result = self
            .fetch(handle)
            .await
            .and_then(|body| parse_syndication(&body));

        match result {
            Ok(CheckResult::Available) => {
                info!("X username @{handle} is available");
                CheckResult::Available
            }
            Ok(CheckResult::Taken) => {
                info!("Fetched X user @{handle}, username is unavailable");
                CheckResult::Taken
            }
            Ok(CheckResult::Unknown) => CheckResult::Unknown,
            Err(e) => {
                error!("Failed to determine availability of X username @{handle}: {e}");
                CheckResult::Unknown
            }
        }
    }
}

/// Maps a users/show lookup status, logging suspended accounts as informational.
pub fn classify_lookup(handle: &str, status: StatusCode) -> CheckResult {
    match status {
        StatusCode::OK => {
            info!("Fetched Twitter user @{handle}, username is unavailable");
            CheckResult::Taken
        }
        StatusCode::NOT_FOUND => {
            info!("Twitter username @{handle} is available");
            CheckResult::Available
        }
        StatusCode::FORBIDDEN => {
            info!("Failed to fetch Twitter user @{handle}, HTTP {status} (likely suspended)");
            CheckResult::Unknown
        }
        _ => {
            error!("Failed to fetch Twitter user @{handle}, HTTP {status}");
            CheckResult::Unknown
        }
    }
}

/// Checker for Twitter backed by the official API.
pub struct TwitterChecker {
    session: TwitterSession,
}

impl TwitterChecker {
    pub fn new(session: TwitterSession) -> Self {
        TwitterChecker { session }
    }
}

#[async_trait]
impl Checker for TwitterChecker {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn check(&self, handle: &str) -> CheckResult {
        match self.session.get(&Platform::Twitter.probe_url(handle)).await {
            Ok(resp) => {
                let status = resp.status();
                if log::log_enabled!(Level::Trace) {
                    trace!("{}", resp.text().await.unwrap_or_default());
                }
                classify_lookup(handle, status)
            }
            Err(e) => {
                error!("Failed to fetch Twitter user @{handle}, {e}");
                CheckResult::Unknown
            }
        }
    }
}
