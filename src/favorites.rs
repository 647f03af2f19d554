//! Favorites persistence over local key-value storage.
//!
//! The collection is read once when the store is built and written back after
//! every mutation. Storage problems are logged and otherwise ignored: a broken
//! read looks like an empty list and a failed write is dropped.
use crate::error::StorageError;
use crate::models::FavoriteMovie;
use crate::storage::KeyValueStorage;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const FAVORITES_KEY: &str = "movieExplorerFavorites";

pub struct FavoritesStore {
    storage: Arc<dyn KeyValueStorage>,
    items: Vec<FavoriteMovie>,
    /// Entry removed by the latest toggle and its slot; an immediate re-add puts it back as it was.
    last_removed: Option<(usize, FavoriteMovie)>,
}

impl FavoritesStore {
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let items = match read_favorites(storage.as_ref()) {
            Ok(items) => items,
            Err(e) => {
                warn!("Error reading favorites, starting empty: {}", e);
                Vec::new()
            }
        };
        info!("Loaded {} favorites", items.len());
        Self {
            storage,
            items,
            last_removed: None,
        }
    }

    pub fn list(&self) -> &[FavoriteMovie] {
        &self.items
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.items.iter().any(|m| m.id == id)
    }

    /// Adds the movie if absent, removes it otherwise. Returns whether it is now a favorite.
    pub fn toggle(&mut self, movie: FavoriteMovie) -> bool {
        let now_favorite = match self.items.iter().position(|m| m.id == movie.id) {
            Some(idx) => {
                let removed = self.items.remove(idx);
                self.last_removed = Some((idx, removed));
                false
            }
            None => {
                match self.last_removed.take() {
                    Some((idx, removed)) if removed.id == movie.id && idx <= self.items.len() => {
                        self.items.insert(idx, removed)
                    }
                    _ => self.items.push(movie),
                }
                true
            }
        };
        self.persist();
        now_favorite
    }

    fn persist(&self) {
        let body = match serde_json::to_string(&self.items) {
            Ok(body) => body,
            Err(e) => {
                warn!("Error serializing favorites: {}", e);
                return;
            }
        };
        match self.storage.set(FAVORITES_KEY, &body) {
            Ok(()) => debug!("Persisted {} favorites", self.items.len()),
            Err(e) => warn!("Error writing favorites: {}", e),
        }
    }
}

fn read_favorites(storage: &dyn KeyValueStorage) -> Result<Vec<FavoriteMovie>, StorageError> {
    let Some(raw) = storage.get(FAVORITES_KEY)? else {
        return Ok(Vec::new());
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: Vec<FavoriteMovie> =
        serde_json::from_str(&raw).map_err(|source| StorageError::Corrupted {
            key: FAVORITES_KEY.to_string(),
            source,
        })?;

    // Files edited by hand may repeat an id; keep the first occurrence.
    let mut items: Vec<FavoriteMovie> = Vec::with_capacity(parsed.len());
    for movie in parsed {
        if !items.iter().any(|m| m.id == movie.id) {
            items.push(movie);
        }
    }
    Ok(items)
}
