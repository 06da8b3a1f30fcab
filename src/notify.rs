use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

use crate::error::Error;
use crate::platform::Platform;

const AUTHOR_NAME: &str = "Moniker";
const AUTHOR_URL: &str = "https://github.com/EthanC/Moniker";
const AUTHOR_ICON: &str = "https://i.imgur.com/gImd2zu.png";

/// Attempts made before a rate-limited webhook delivery is abandoned.
const MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);
/// Longest wait honoured between attempts, whatever the webhook asks for.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Announcement that a handle is free to register.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub platform: Platform,
    pub handle: String,
    pub description: String,
    pub color: u32,
    pub footer_text: String,
    pub footer_icon: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(platform: Platform, handle: &str) -> Self {
        Self::at(platform, handle, Utc::now())
    }

    /// Renders the notification for a detection at `timestamp`.
    pub fn at(platform: Platform, handle: &str, timestamp: DateTime<Utc>) -> Self {
        let url = platform.profile_url(handle);
        let description = format!(
            "{platform} {} [{}]({url}) is currently available.",
            platform.handle_noun(),
            platform.display_handle(handle),
        );

        Notification {
            platform,
            handle: handle.to_string(),
            description,
            color: platform.color(),
            footer_text: platform.name().to_string(),
            footer_icon: platform.footer_icon().to_string(),
            url,
            timestamp,
        }
    }
}

/// Delivers notifications to their destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), Error>;
}

#[derive(Serialize)]
struct DiscordMessage<'a> {
    embeds: [DiscordEmbed<'a>; 1],
}

#[derive(Serialize)]
struct DiscordEmbed<'a> {
    description: &'a str,
    url: &'a str,
    color: u32,
    author: DiscordAuthor,
    footer: DiscordFooter<'a>,
    timestamp: String,
}

#[derive(Serialize)]
struct DiscordAuthor {
    name: &'static str,
    url: &'static str,
    icon_url: &'static str,
}

#[derive(Serialize)]
struct DiscordFooter<'a> {
    text: &'a str,
    icon_url: &'a str,
}

#[derive(Deserialize)]
struct RateLimited {
    retry_after: f64,
}

impl<'a> From<&'a Notification> for DiscordMessage<'a> {
    fn from(n: &'a Notification) -> Self {
        DiscordMessage {
            embeds: [DiscordEmbed {
                description: &n.description,
                url: &n.url,
                color: n.color,
                author: DiscordAuthor {
                    name: AUTHOR_NAME,
                    url: AUTHOR_URL,
                    icon_url: AUTHOR_ICON,
                },
                footer: DiscordFooter {
                    text: &n.footer_text,
                    icon_url: &n.footer_icon,
                },
                timestamp: n.timestamp.to_rfc3339(),
            }],
        }
    }
}

/// Posts notifications as embeds to a Discord webhook.
pub struct DiscordNotifier {
    client: Client,
    webhook_url: Url,
}

impl DiscordNotifier {
    pub fn new(client: Client, webhook_url: Url) -> Self {
        DiscordNotifier {
            client,
            webhook_url,
        }
    }
}

/// Wait requested by a rate-limited response, body value first, then the
/// header, capped at [`MAX_RETRY_AFTER`].
fn retry_delay(body: &str, header: Option<&str>) -> Duration {
    serde_json::from_str::<RateLimited>(body)
        .ok()
        .map(|r| r.retry_after)
        .or_else(|| header.and_then(|h| h.trim().parse::<f64>().ok()))
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.min(MAX_RETRY_AFTER.as_secs_f64()))
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Wait before the next attempt, `None` once attempts are exhausted.
fn backoff(attempt: u32, requested: Duration) -> Option<Duration> {
    (attempt < MAX_ATTEMPTS).then_some(requested)
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), Error> {
        let payload = DiscordMessage::from(notification);

        for attempt in 1..=MAX_ATTEMPTS {
            let resp = self
                .client
                .post(self.webhook_url.clone())
                .json(&payload)
                .send()
                .await?;
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let header = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = resp.text().await.unwrap_or_default();
                let Some(delay) = backoff(attempt, retry_delay(&body, header.as_deref())) else {
                    warn!("Discord webhook rate limited, giving up after {MAX_ATTEMPTS} attempts");
                    break;
                };
                warn!(
                    "Discord webhook rate limited (attempt {attempt}/{MAX_ATTEMPTS}), retrying in {delay:?}"
                );
                sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                return Err(Error::Webhook(status.as_u16()));
            }

            info!(
                "Sent notification for {} {}",
                notification.platform,
                notification.platform.display_handle(&notification.handle)
            );
            return Ok(());
        }

        Err(Error::Webhook(StatusCode::TOO_MANY_REQUESTS.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Canned, local_client, serve};
    use chrono::TimeZone;

    fn detected() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_github_notification() {
        let n = Notification::at(Platform::GitHub, "alice", detected());
        assert_eq!(
            n.description,
            "GitHub username [@alice](https://github.com/alice) is currently available."
        );
        assert_eq!(n.color, 0x0017_1515);
        assert_eq!(n.footer_text, "GitHub");
        assert_eq!(n.footer_icon, "https://i.imgur.com/C3M0uwh.png");
        assert_eq!(n.url, "https://github.com/alice");
    }

    #[test]
    fn test_cashapp_uses_cashtag_wording() {
        let n = Notification::at(Platform::CashApp, "alice", detected());
        assert_eq!(
            n.description,
            "Cash App $Cashtag [$alice](https://cash.app/$alice) is currently available."
        );
        assert_eq!(n.footer_text, "Cash App");
    }

    #[test]
    fn test_formatting_is_deterministic() {
        assert_eq!(
            Notification::at(Platform::Venmo, "bob", detected()),
            Notification::at(Platform::Venmo, "bob", detected())
        );
    }

    #[test]
    fn test_discord_payload_shape() {
        let n = Notification::at(Platform::Mastodon, "alice", detected());
        let json = serde_json::to_value(DiscordMessage::from(&n)).unwrap();
        let embed = &json["embeds"][0];

        assert_eq!(embed["color"], 0x0063_64FF);
        assert_eq!(embed["url"], "https://mastodon.social/@alice");
        assert_eq!(embed["footer"]["text"], "Mastodon");
        assert_eq!(embed["author"]["name"], "Moniker");
        assert_eq!(embed["timestamp"], "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_retry_delay_sources() {
        assert_eq!(
            retry_delay(r#"{"message":"You are being rate limited.","retry_after":0.5,"global":false}"#, None),
            Duration::from_millis(500)
        );
        assert_eq!(retry_delay("", Some("2")), Duration::from_secs(2));
        assert_eq!(retry_delay("", None), DEFAULT_RETRY_AFTER);
        assert_eq!(retry_delay("", Some("soon")), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn test_retry_delay_rejects_unusable_values() {
        assert_eq!(retry_delay(r#"{"retry_after":1e30}"#, None), MAX_RETRY_AFTER);
        assert_eq!(retry_delay("", Some("1e300")), MAX_RETRY_AFTER);
        assert_eq!(retry_delay(r#"{"retry_after":-3}"#, None), DEFAULT_RETRY_AFTER);
        assert_eq!(retry_delay("", Some("NaN")), DEFAULT_RETRY_AFTER);
        assert_eq!(retry_delay("", Some("inf")), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn test_no_wait_after_the_last_attempt() {
        let delay = Duration::from_secs(2);
        assert_eq!(backoff(1, delay), Some(delay));
        assert_eq!(backoff(MAX_ATTEMPTS - 1, delay), Some(delay));
        assert_eq!(backoff(MAX_ATTEMPTS, delay), None);
    }

    #[tokio::test]
    async fn test_delivery_retries_rate_limits_then_gives_up() {
        let server = serve(&[(
            "/api/webhooks/1/token",
            Canned::body(429, r#"{"message":"You are being rate limited.","retry_after":0.01,"global":false}"#),
        )])
        .await;
        let webhook = server.origin.join("/api/webhooks/1/token").unwrap();
        let notifier = DiscordNotifier::new(local_client(), webhook);

        let result = notifier
            .notify(&Notification::at(Platform::GitHub, "alice", detected()))
            .await;

        assert!(matches!(result, Err(Error::Webhook(429))));
        assert_eq!(server.requests().len(), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_delivery_succeeds_on_no_content() {
        let server = serve(&[("/api/webhooks/1/token", Canned::status(204))]).await;
        let webhook = server.origin.join("/api/webhooks/1/token").unwrap();
        let notifier = DiscordNotifier::new(local_client(), webhook);

        let result = notifier
            .notify(&Notification::at(Platform::Venmo, "alice", detected()))
            .await;

        assert!(result.is_ok());
        assert_eq!(
            server.requests(),
            ["POST /api/webhooks/1/token HTTP/1.1"]
        );
    }

    #[ignore = "This test requires a valid Discord webhook URL"]
    #[tokio::test]
    async fn test_discord_notification() {
        let webhook_url = dotenvy::var("DISCORD_NOTIFY_WEBHOOK").expect("DISCORD_NOTIFY_WEBHOOK not set");
        let notifier = DiscordNotifier::new(Client::new(), Url::parse(&webhook_url).unwrap());
        let result = notifier
            .notify(&Notification::new(Platform::GitHub, "moniker-test"))
            .await;
        assert!(
            result.is_ok(),
            "Expected notification to be sent successfully"
        );
    }
}
