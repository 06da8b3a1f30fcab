use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::{fmt, str::FromStr};
use url::Url;

use crate::error::Error;

/// Characters left untouched when a value is embedded in a URL (RFC 3986 unreserved).
pub(crate) const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A third-party service whose usernames can be monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    GitHub,
    Mastodon,
    Snapchat,
    /// Official Twitter API, requires application credentials.
    Twitter,
    /// Unauthenticated syndication endpoint.
    X,
    YouTube,
    CashApp,
    Venmo,
}

impl Platform {
    /// Every platform, in the order a run processes them.
    pub const ALL: [Platform; 8] = [
        Platform::GitHub,
        Platform::Mastodon,
        Platform::Snapchat,
        Platform::Twitter,
        Platform::X,
        Platform::YouTube,
        Platform::CashApp,
        Platform::Venmo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Platform::GitHub => "GitHub",
            Platform::Mastodon => "Mastodon",
            Platform::Snapchat => "Snapchat",
            Platform::Twitter => "Twitter",
            Platform::X => "X",
            Platform::YouTube => "YouTube",
            Platform::CashApp => "Cash App",
            Platform::Venmo => "Venmo",
        }
    }

    /// Environment variable holding the comma-separated handle list.
    pub fn env_key(self) -> &'static str {
        match self {
            Platform::GitHub => "GITHUB_USERNAMES",
            Platform::Mastodon => "MASTODON_USERNAMES",
            Platform::Snapchat => "SNAPCHAT_USERNAMES",
            Platform::Twitter => "TWITTER_USERNAMES",
            Platform::X => "X_USERNAMES",
            Platform::YouTube => "YOUTUBE_USERNAMES",
            Platform::CashApp => "CASHAPP_USERNAMES",
            Platform::Venmo => "VENMO_USERNAMES",
        }
    }

    /// Key of the `[usernames]` table in the config file.
    pub fn config_key(self) -> &'static str {
        match self {
            Platform::GitHub => "github",
            Platform::Mastodon => "mastodon",
            Platform::Snapchat => "snapchat",
            Platform::Twitter => "twitter",
            Platform::X => "x",
            Platform::YouTube => "youtube",
            Platform::CashApp => "cashapp",
            Platform::Venmo => "venmo",
        }
    }

    /// Prefix used when displaying a handle, `$` for cashtags.
    pub fn sigil(self) -> char {
        match self {
            Platform::CashApp => '$',
            _ => '@',
        }
    }

    /// What the platform calls a handle.
    pub fn handle_noun(self) -> &'static str {
        match self {
            Platform::CashApp => "$Cashtag",
            _ => "username",
        }
    }

    pub fn display_handle(self, handle: &str) -> String {
        format!("{}{handle}", self.sigil())
    }

    /// URL requested to decide availability.
    pub fn probe_url(self, handle: &str) -> String {
        let h = encode_handle(handle);
        match self {
            Platform::GitHub => format!("https://github.com/{h}"),
            Platform::Mastodon => {
                format!("https://mastodon.social/api/v1/accounts/lookup?acct={h}")
            }
            Platform::Snapchat => format!("https://www.snapchat.com/add/{h}"),
            Platform::Twitter => {
                format!("https://api.twitter.com/1.1/users/show.json?screen_name={h}")
            }
            Platform::X => {
                format!("https://syndication.twitter.com/srv/timeline-profile/screen-name/{h}")
            }
            Platform::YouTube | Platform::CashApp | Platform::Venmo => self.profile_url(handle),
        }
    }

    /// Public profile URL linked from notifications.
    pub fn profile_url(self, handle: &str) -> String {
        let h = encode_handle(handle);
        match self {
            Platform::GitHub => format!("https://github.com/{h}"),
            Platform::Mastodon => format!("https://mastodon.social/@{h}"),
            Platform::Snapchat => format!("https://snapchat.com/add/{h}"),
            Platform::Twitter => format!("https://twitter.com/{h}"),
            Platform::X => format!("https://x.com/{h}"),
            Platform::YouTube => format!("https://youtube.com/@{h}"),
            Platform::CashApp => format!("https://cash.app/${h}"),
            Platform::Venmo => format!("https://venmo.com/u/{h}"),
        }
    }

    /// Embed accent color as `0xRRGGBB`.
    pub fn color(self) -> u32 {
        match self {
            Platform::GitHub => 0x0017_1515,
            Platform::Mastodon => 0x0063_64FF,
            Platform::Snapchat => 0x00FF_FC00,
            Platform::Twitter | Platform::X => 0x001D_9BF0,
            Platform::YouTube => 0x00FF_0000,
            Platform::CashApp => 0x0000_C244,
            Platform::Venmo => 0x0000_8CFF,
        }
    }

    pub fn footer_icon(self) -> &'static str {
        match self {
            Platform::GitHub => "https://i.imgur.com/C3M0uwh.png",
            Platform::Mastodon => "https://i.imgur.com/Xh51yxT.png",
            Platform::Snapchat => "https://i.imgur.com/NARmOty.png",
            Platform::Twitter => "https://i.imgur.com/6BAmj0I.png",
            Platform::X => "https://i.imgur.com/hZbC8my.png",
            Platform::YouTube => "https://i.imgur.com/sBcs6ct.png",
            Platform::CashApp => "https://i.imgur.com/Mbr5HTD.png",
            Platform::Venmo => "https://i.imgur.com/F2Vsv73.png",
        }
    }

    /// Whether the probe must follow redirects to reach the final status.
    pub fn follows_redirects(self) -> bool {
        matches!(
            self,
            Platform::Snapchat | Platform::YouTube | Platform::CashApp | Platform::Venmo
        )
    }

    /// Whether timeouts are expected noise rather than failures worth an error log.
    pub fn ignores_timeouts(self) -> bool {
        matches!(self, Platform::Venmo)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.config_key() == key)
            .ok_or_else(|| Error::Config(format!("unknown platform `{s}`")))
    }
}

fn encode_handle(handle: &str) -> String {
    utf8_percent_encode(handle, UNRESERVED).to_string()
}

/// Points `url` at another origin, keeping its path and query.
pub(crate) fn rebase(url: &str, origin: &Url) -> Result<String, Error> {
    let mut rebased = Url::parse(url)?;
    rebased
        .set_scheme(origin.scheme())
        .map_err(|()| Error::Config(format!("cannot use scheme of {origin}")))?;
    rebased.set_host(origin.host_str())?;
    rebased
        .set_port(origin.port())
        .map_err(|()| Error::Config(format!("cannot use port of {origin}")))?;
    Ok(rebased.into())
}
