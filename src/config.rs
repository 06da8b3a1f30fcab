use log::{debug, error, info, warn};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use url::Url;

use crate::error::Error;
use crate::platform::Platform;
use crate::twitter::TwitterCredentials;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Optional settings file, every value of which the environment can override.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    config: ConfigOptions,
    #[serde(default)]
    usernames: BTreeMap<String, Vec<String>>,
    twitter: Option<TwitterCredentials>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOptions {
    timeout_secs: Option<u64>,
    webhook_url: Option<String>,
}

/// Everything a run needs, gathered once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub timeout_secs: u64,
    pub webhook_url: Option<Url>,
    pub twitter: Option<TwitterCredentials>,
    usernames: BTreeMap<Platform, Vec<String>>,
}

impl Config {
    /// Loads `.env`, the optional config file and the process environment.
    ///
    /// # Errors
    ///
    /// Fails when an explicitly named config file is unreadable or the file
    /// is not valid TOML. Unusable values are logged and ignored instead.
    pub fn load() -> Result<Config, Error> {
        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment variables from {}", path.display());
        }

        let file = match dotenvy::var("MONIKER_CONFIG") {
            Ok(path) => Some(read_file(Path::new(&path))?),
            Err(_) => match default_path() {
                Some(path) if path.exists() => Some(read_file(&path)?),
                _ => None,
            },
        };

        Ok(Self::build(file.unwrap_or_default(), |key| dotenvy::var(key).ok()))
    }

    /// Builds a configuration from the given file and key lookup.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn from_file_and_lookup<F>(path: &Path, lookup: F) -> Result<Config, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self::build(read_file(path)?, lookup))
    }

    /// Builds a configuration from a key lookup alone.
    pub fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(FileConfig::default(), lookup)
    }

    /// Gathers every value; an unusable one is logged and treated as unset so
    /// the checks still run.
    fn build<F>(mut file: FileConfig, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout = get("MONIKER_TIMEOUT_SECS")
            .map(|v| parse_timeout(&v))
            .or_else(|| file.config.timeout_secs.map(nonzero_timeout));
        let timeout_secs = match timeout {
            Some(Ok(secs)) => secs,
            Some(Err(e)) => {
                error!("{e}, using {DEFAULT_TIMEOUT_SECS} seconds");
                DEFAULT_TIMEOUT_SECS
            }
            None => DEFAULT_TIMEOUT_SECS,
        };

        let webhook = get("DISCORD_NOTIFY_WEBHOOK")
            .or_else(|| get("DISCORD_WEBHOOK_URL"))
            .or(file.config.webhook_url.take())
            .map(|u| Url::parse(u.trim()));
        let webhook_url = match webhook {
            Some(Ok(url)) => Some(url),
            Some(Err(e)) => {
                error!("Discord webhook URL is malformed ({e}), no notifications will be sent");
                None
            }
            None => None,
        };

        let mut usernames = BTreeMap::new();
        for (key, handles) in std::mem::take(&mut file.usernames) {
            match key.parse::<Platform>() {
                Ok(platform) => {
                    usernames.insert(platform, clean_handles(handles));
                }
                Err(e) => warn!("Ignoring [usernames] entry: {e}"),
            }
        }
        for platform in Platform::ALL {
            if let Some(list) = get(platform.env_key()) {
                usernames.insert(platform, split_handles(&list));
            }
        }
        usernames.retain(|_, handles: &mut Vec<String>| !handles.is_empty());

        let twitter = twitter_credentials(&get).or(file.twitter);

        Config {
            timeout_secs,
            webhook_url,
            twitter,
            usernames,
        }
    }

    /// Handles configured for a platform, empty when none are.
    pub fn usernames(&self, platform: Platform) -> &[String] {
        self.usernames.get(&platform).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("moniker").join("config.toml"))
}

fn read_file(path: &Path) -> Result<FileConfig, Error> {
    debug!("Reading configuration from {}", path.display());
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Parses a request timeout in whole seconds.
fn parse_timeout(value: &str) -> Result<u64, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("MONIKER_TIMEOUT_SECS is not a number: {value}")))
        .and_then(nonzero_timeout)
}

fn nonzero_timeout(secs: u64) -> Result<u64, Error> {
    if secs == 0 {
        Err(Error::Config("timeout must be at least one second".into()))
    } else {
        Ok(secs)
    }
}

fn twitter_credentials<F>(get: &F) -> Option<TwitterCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    let keys = [
        "TWITTER_API_KEY",
        "TWITTER_API_KEY_SECRET",
        "TWITTER_ACCESS_TOKEN",
        "TWITTER_ACCESS_TOKEN_SECRET",
    ];
    match keys.map(get) {
        [Some(api_key), Some(api_key_secret), Some(access_token), Some(access_token_secret)] => {
            Some(TwitterCredentials {
                api_key,
                api_key_secret,
                access_token,
                access_token_secret,
            })
        }
        [None, None, None, None] => None,
        _ => {
            warn!("Twitter credentials are only partially set, ignoring them");
            None
        }
    }
}

/// Splits a comma-separated handle list, dropping blanks.
pub fn split_handles(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_handles(handles: Vec<String>) -> Vec<String> {
    handles
        .into_iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect()
}
