use crate::storage::KeyValueStorage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Theme preference, kept in the same storage as favorites.
pub struct ThemePreference {
    storage: Arc<dyn KeyValueStorage>,
    current: Theme,
}

impl ThemePreference {
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let current = match storage.get(THEME_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring stored theme {:?}: {}", raw, e);
                Theme::default()
            }),
            Ok(None) => Theme::default(),
            Err(e) => {
                warn!("Error reading theme: {}", e);
                Theme::default()
            }
        };
        Self { storage, current }
    }

    pub fn current(&self) -> Theme {
        self.current
    }

    pub fn toggle(&mut self) -> Theme {
        self.current = self.current.toggled();
        match serde_json::to_string(&self.current) {
            Ok(body) => {
                if let Err(e) = self.storage.set(THEME_KEY, &body) {
                    warn!("Error writing theme: {}", e);
                }
            }
            Err(e) => warn!("Error serializing theme: {}", e),
        }
        self.current
    }
}
