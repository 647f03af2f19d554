use crate::auth::UserDirectory;
use crate::omdb::OMDB_BASE;
use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_BIND: &str = "0.0.0.0:3146";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub omdb_api_key: Option<String>,
    pub omdb_base_url: String,
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub session_secret: String,
    pub users: UserDirectory,
    pub debounce: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let omdb_api_key = get("OMDB_API_KEY");
        if omdb_api_key.is_none() {
            warn!("OMDB_API_KEY is not set; searches will come back empty");
        }
        let omdb_base_url = get("OMDB_BASE_URL").unwrap_or_else(|| OMDB_BASE.to_string());

        let bind_raw = get("MARQUEE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw
            .parse()
            .with_context(|| format!("MARQUEE_BIND is not a socket address: {bind_raw}"))?;

        let data_dir = PathBuf::from(
            get("MARQUEE_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );

        let session_secret = get("MARQUEE_SESSION_SECRET")
            .ok_or_else(|| anyhow::anyhow!("MARQUEE_SESSION_SECRET must be set"))?;

        let users = match get("MARQUEE_USERS") {
            Some(raw) => UserDirectory::parse(&raw).context("Invalid MARQUEE_USERS")?,
            None => {
                info!("MARQUEE_USERS not set, using the demo account");
                UserDirectory::demo()
            }
        };
        if users.is_empty() {
            anyhow::bail!("MARQUEE_USERS defines no users");
        }

        let debounce_ms = match get("MARQUEE_DEBOUNCE_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("MARQUEE_DEBOUNCE_MS is not a number: {raw}"))?,
            None => DEFAULT_DEBOUNCE_MS,
        };

        Ok(Self {
            omdb_api_key,
            omdb_base_url,
            bind,
            data_dir,
            session_secret,
            users,
            debounce: Duration::from_millis(debounce_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("MARQUEE_SESSION_SECRET", "s")])).unwrap();
        assert_eq!(config.omdb_api_key, None);
        assert_eq!(config.omdb_base_url, OMDB_BASE);
        assert_eq!(config.bind.port(), 3146);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert!(config.users.authorize("user@example.com", "password123").is_some());
    }

    #[test]
    fn secret_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("MARQUEE_SESSION_SECRET", "  ")])).is_err());
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("MARQUEE_SESSION_SECRET", "s"),
            ("OMDB_API_KEY", "k"),
            ("MARQUEE_BIND", "127.0.0.1:8080"),
            ("MARQUEE_DEBOUNCE_MS", "250"),
            ("MARQUEE_USERS", "a@x.io:pw:Ann"),
        ]))
        .unwrap();
        assert_eq!(config.omdb_api_key.as_deref(), Some("k"));
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert!(config.users.authorize("user@example.com", "password123").is_none());
    }

    #[test]
    fn bad_values_fail() {
        assert!(Config::from_lookup(lookup(&[
            ("MARQUEE_SESSION_SECRET", "s"),
            ("MARQUEE_BIND", "nope"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup(&[
            ("MARQUEE_SESSION_SECRET", "s"),
            ("MARQUEE_USERS", ";;"),
        ]))
        .is_err());
    }
}
