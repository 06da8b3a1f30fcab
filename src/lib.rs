//! Monitors usernames across third-party platforms and reports the ones
//! that are free to register.

pub mod check;
pub mod config;
pub mod error;
pub mod notify;
pub mod platform;
#[cfg(test)]
mod test_support;
pub mod twitter;
pub mod worker;

pub use check::{CheckResult, Checker};
pub use config::Config;
pub use error::Error;
pub use notify::{Notification, Notifier};
pub use platform::Platform;
pub use worker::{RunSummary, monitor_usernames, run};
