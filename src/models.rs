use serde::{Deserialize, Serialize};

/// Shown when a movie has no poster of its own.
pub const FALLBACK_POSTER_URL: &str = "https://via.placeholder.com/500x750?text=Poster+Unavailable";

/// Listing/detail projection of a catalog entry. Rebuilt from every upstream response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub poster_path: Option<String>,
    pub vote_average: f64,
    pub release_date: String,
    pub overview: String,
}

/// Minimal record kept in the favorites collection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FavoriteMovie {
    pub id: String,
    pub title: String,
    pub poster_path: Option<String>,
}

impl Movie {
    pub fn favorite_stub(&self) -> FavoriteMovie {
        FavoriteMovie {
            id: self.id.clone(),
            title: self.title.clone(),
            poster_path: self.poster_path.clone(),
        }
    }

    pub fn poster_url(&self) -> &str {
        poster_or_fallback(self.poster_path.as_deref())
    }
}

impl FavoriteMovie {
    pub fn poster_url(&self) -> &str {
        poster_or_fallback(self.poster_path.as_deref())
    }
}

fn poster_or_fallback(poster: Option<&str>) -> &str {
    match poster {
        Some(p) if !p.trim().is_empty() => p,
        _ => FALLBACK_POSTER_URL,
    }
}
