use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{Client, redirect::Policy};
use std::{collections::HashSet, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::check::{CheckResult, Checker, StatusChecker, SyndicationChecker, TwitterChecker};
use crate::config::Config;
use crate::error::Error;
use crate::notify::{DiscordNotifier, Notification, Notifier};
use crate::platform::Platform;
use crate::twitter::{TwitterCredentials, TwitterSession};

/// Builds the checker a run uses for a platform.
///
/// Called at most once per platform per run, so any authentication happens
/// here and its session is shared by every handle check.
#[async_trait]
pub trait CheckerProvider: Send + Sync {
    async fn checker(&self, platform: Platform) -> Result<Box<dyn Checker>, Error>;
}

/// Provider backed by real HTTP clients.
pub struct HttpProvider {
    direct: Client,
    redirecting: Client,
    twitter: Option<TwitterCredentials>,
}

impl HttpProvider {
    /// # Errors
    ///
    /// Fails when an HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let direct = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        let redirecting = Client::builder().timeout(timeout).build()?;

        Ok(HttpProvider {
            direct,
            redirecting,
            twitter: config.twitter.clone(),
        })
    }
}

#[async_trait]
impl CheckerProvider for HttpProvider {
    async fn checker(&self, platform: Platform) -> Result<Box<dyn Checker>, Error> {
        let client = if platform.follows_redirects() {
            self.redirecting.clone()
        } else {
            self.direct.clone()
        };

        let checker: Box<dyn Checker> = match platform {
            Platform::Twitter => {
                let session = TwitterSession::authenticate(client, self.twitter.as_ref()).await?;
                Box::new(TwitterChecker::new(session))
            }
            Platform::X => Box::new(SyndicationChecker::new(client)),
            _ => Box::new(StatusChecker::new(platform, client)),
        };
        Ok(checker)
    }
}

/// Tally of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub available: usize,
    pub taken: usize,
    pub unknown: usize,
    pub notified: usize,
    pub failed_notifications: usize,
    pub skipped_platforms: usize,
}

/// Checks every configured handle once, platform by platform.
///
/// Failures never escape a single handle, or a single platform when its
/// checker cannot be built. Cancellation stops the run before the next handle.
pub async fn run(
    config: &Config,
    provider: &dyn CheckerProvider,
    notifier: Option<&dyn Notifier>,
    token: &CancellationToken,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for platform in Platform::ALL {
        if token.is_cancelled() {
            info!("Shutdown requested, stopping availability checks");
            break;
        }

        let handles = config.usernames(platform);
        if handles.is_empty() {
            info!("Skipping availability check for {platform}, no usernames configured");
            continue;
        }
        debug!("{platform} usernames: {handles:?}");

        let checker = match provider.checker(platform).await {
            Ok(checker) => checker,
            Err(e) => {
                error!("Skipping availability check for {platform}: {e}");
                summary.skipped_platforms += 1;
                continue;
            }
        };

        check_platform(checker.as_ref(), handles, notifier, token, &mut summary).await;
        info!("Completed availability check for all configured {platform} usernames");
    }

    summary
}

async fn check_platform(
    checker: &dyn Checker,
    handles: &[String],
    notifier: Option<&dyn Notifier>,
    token: &CancellationToken,
    summary: &mut RunSummary,
) {
    let platform = checker.platform();
    let mut seen = HashSet::new();

    for handle in handles {
        if token.is_cancelled() {
            return;
        }
        if !seen.insert(handle.as_str()) {
            debug!("Skipping duplicate {platform} handle {handle}");
            continue;
        }

        match checker.check(handle).await {
            CheckResult::Available => summary.available += 1,
            CheckResult::Taken => {
                summary.taken += 1;
                continue;
            }
            CheckResult::Unknown => {
                summary.unknown += 1;
                continue;
            }
        }

        let Some(notifier) = notifier else {
            continue;
        };
        match notifier.notify(&Notification::new(platform, handle)).await {
            Ok(()) => summary.notified += 1,
            Err(e) => {
                summary.failed_notifications += 1;
                error!(
                    "Failed to send notification for {platform} {}: {e}",
                    platform.display_handle(handle)
                );
            }
        }
    }
}

/// Loads the configuration and performs a single availability run.
///
/// # Errors
///
/// Fails only when the config file or HTTP client setup fails; bad values,
/// check and notification failures are logged instead.
pub async fn monitor_usernames(token: CancellationToken) -> Result<RunSummary, Error> {
    let config = Config::load()?;

    // Initial configuration logging
    info!("Moniker");
    info!("Timeout: {} seconds", config.timeout_secs);
    let notifier = match &config.webhook_url {
        Some(url) => {
            info!("Webhook is set, a notification will be sent for available usernames");
            Some(DiscordNotifier::new(Client::new(), url.clone()))
        }
        None => {
            warn!("Webhook is not set, no notifications will be sent");
            None
        }
    };

    let provider = HttpProvider::new(&config)?;
    let summary = run(
        &config,
        &provider,
        notifier.as_ref().map(|n| n as &dyn Notifier),
        &token,
    )
    .await;

    info!(
        "Run finished: {} available, {} taken, {} unknown, {} notified",
        summary.available, summary.taken, summary.unknown, summary.notified
    );
    if summary.failed_notifications > 0 || summary.skipped_platforms > 0 {
        warn!(
            "{} notification(s) failed, {} platform(s) skipped",
            summary.failed_notifications, summary.skipped_platforms
        );
    }

    Ok(summary)
}
