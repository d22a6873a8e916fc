//! Logging initialization.
//!
//! One entry point sets up the tracing subscriber for the whole process.

use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

const CRATES: [&str; 5] = [
    "tracery",
    "tracery_core",
    "tracery_delta",
    "tracery_patch",
    "tracery_sdk",
];

/// Logging profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Profile {
    /// Human-readable output at debug level.
    Development,
    /// JSON structured output at info level.
    Production,
    /// Bare registry, nothing is printed.
    Test,
}

static INIT_ONCE: Once = Once::new();

fn default_filter(level: &str) -> EnvFilter {
    let directives: Vec<String> = CRATES
        .iter()
        .map(|krate| format!("{}={}", krate, level))
        .collect();
    EnvFilter::new(directives.join(","))
}

/// Initialize the logging facility.
///
/// `RUST_LOG` overrides the profile's default filter. Only the first call
/// has any effect, and a subscriber installed elsewhere is left alone.
///
/// ```
/// use tracery_sdk::logging::{init, Profile};
///
/// init(Profile::Test);
/// ```
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let installed = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter("debug")),
                )
                .try_init()
                .is_ok(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter("info")),
                )
                .try_init()
                .is_ok(),
            Profile::Test => tracing_subscriber::registry().try_init().is_ok(),
        };
        if !installed {
            tracing::debug!(?profile, "Subscriber already installed");
        }
    });
}
