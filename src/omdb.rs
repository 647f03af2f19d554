use crate::error::CatalogError;
use crate::models::Movie;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

pub const OMDB_BASE: &str = "https://www.omdbapi.com/";
/// OMDb has no "popular" endpoint, so an empty query searches this term.
pub const DEFAULT_QUERY: &str = "popular";
const SEARCH_OVERVIEW: &str = "Fetch details to see the plot.";
const NOT_AVAILABLE: &str = "N/A";

#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn search_movies(&self, query: &str, page: u32) -> Result<Vec<Movie>, CatalogError>;
    async fn get_movie_by_id(&self, id: &str) -> Result<Option<Movie>, CatalogError>;
}

#[derive(Debug, Clone)]
pub struct OmdbClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OmdbClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn search_url(&self, api_key: &str, query: &str, page: u32) -> String {
        format!(
            "{}?apikey={}&s={}&type=movie&page={page}",
            self.base_url,
            urlencoding::encode(api_key),
            urlencoding::encode(query)
        )
    }

    fn detail_url(&self, api_key: &str, id: &str) -> String {
        format!(
            "{}?apikey={}&i={}&plot=full",
            self.base_url,
            urlencoding::encode(api_key),
            urlencoding::encode(id)
        )
    }

    fn api_key(&self) -> Result<&str, CatalogError> {
        self.api_key.as_deref().ok_or(CatalogError::MissingApiKey)
    }

    /// Raw search body, before any validation.
    pub async fn fetch_search_body(&self, query: &str, page: u32) -> Result<String, CatalogError> {
        let key = self.api_key()?;
        let query = effective_query(query);
        debug!("OMDb search '{}' page {}", query, page);
        self.get_text(&self.search_url(key, query, page.max(1))).await
    }

    /// Raw detail body, before any validation.
    pub async fn fetch_detail_body(&self, id: &str) -> Result<String, CatalogError> {
        let key = self.api_key()?;
        debug!("OMDb detail {}", id);
        self.get_text(&self.detail_url(key, id)).await
    }

    async fn get_text(&self, url: &str) -> Result<String, CatalogError> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: redact_key(url),
                status: status.as_u16(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl CatalogApi for OmdbClient {
    async fn search_movies(&self, query: &str, page: u32) -> Result<Vec<Movie>, CatalogError> {
        let body = self.fetch_search_body(query, page).await?;
        parse_search(&body)
    }

    async fn get_movie_by_id(&self, id: &str) -> Result<Option<Movie>, CatalogError> {
        let body = self.fetch_detail_body(id).await?;
        parse_detail(&body)
    }
}

/// Searches the catalog, folding every upstream failure into "no results".
pub async fn search_or_empty(catalog: &dyn CatalogApi, query: &str, page: u32) -> Vec<Movie> {
    match catalog.search_movies(query, page).await {
        Ok(movies) => movies,
        Err(e) => {
            warn!("Catalog search '{}' page {} failed: {}", query, page, e);
            Vec::new()
        }
    }
}

/// Looks up one movie, folding every upstream failure into "not found".
pub async fn movie_or_none(catalog: &dyn CatalogApi, id: &str) -> Option<Movie> {
    match catalog.get_movie_by_id(id).await {
        Ok(movie) => movie,
        Err(e) => {
            warn!("Catalog lookup '{}' failed: {}", id, e);
            None
        }
    }
}

pub fn effective_query(query: &str) -> &str {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        DEFAULT_QUERY
    } else {
        trimmed
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "Response")]
enum SearchEnvelope {
    #[serde(rename = "True")]
    Found {
        #[serde(rename = "Search")]
        search: Vec<SearchItem>,
    },
    #[serde(rename = "False")]
    Failed {
        #[serde(rename = "Error", default)]
        error: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "imdbID")]
    imdb_id: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Year", default)]
    year: Option<String>,
    #[serde(rename = "Poster", default)]
    poster: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "Response")]
enum DetailEnvelope {
    #[serde(rename = "True")]
    Found(Box<DetailItem>),
    #[serde(rename = "False")]
    Failed {
        #[serde(rename = "Error", default)]
        error: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct DetailItem {
    #[serde(rename = "imdbID")]
    imdb_id: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Poster", default)]
    poster: Option<String>,
    #[serde(rename = "imdbRating", default)]
    imdb_rating: Option<String>,
    #[serde(rename = "Released", default)]
    released: Option<String>,
    #[serde(rename = "Plot", default)]
    plot: Option<String>,
}

pub fn parse_search(body: &str) -> Result<Vec<Movie>, CatalogError> {
    let envelope: SearchEnvelope = serde_json::from_str(body)
        .map_err(|e| CatalogError::MalformedResponse(format!("search: {e}")))?;
    match envelope {
        SearchEnvelope::Found { search } => search
            .into_iter()
            .map(|item| {
                Ok(Movie {
                    id: require_id(item.imdb_id)?,
                    title: item.title,
                    poster_path: poster_path(item.poster),
                    vote_average: 0.0,
                    release_date: item.year.unwrap_or_default(),
                    overview: SEARCH_OVERVIEW.to_string(),
                })
            })
            .collect(),
        SearchEnvelope::Failed { error } => {
            debug!("OMDb search returned no results: {:?}", error);
            Ok(Vec::new())
        }
    }
}

pub fn parse_detail(body: &str) -> Result<Option<Movie>, CatalogError> {
    let envelope: DetailEnvelope = serde_json::from_str(body)
        .map_err(|e| CatalogError::MalformedResponse(format!("detail: {e}")))?;
    match envelope {
        DetailEnvelope::Found(item) => {
            let DetailItem {
                imdb_id,
                title,
                poster,
                imdb_rating,
                released,
                plot,
            } = *item;
            Ok(Some(Movie {
                id: require_id(imdb_id)?,
                title,
                poster_path: poster_path(poster),
                vote_average: parse_rating(imdb_rating.as_deref()),
                release_date: released.unwrap_or_default(),
                overview: plot.unwrap_or_default(),
            }))
        }
        DetailEnvelope::Failed { error } => {
            debug!("OMDb detail not found: {:?}", error);
            Ok(None)
        }
    }
}

fn require_id(id: String) -> Result<String, CatalogError> {
    if id.trim().is_empty() {
        return Err(CatalogError::MalformedResponse("empty imdbID".to_string()));
    }
    Ok(id)
}

fn poster_path(raw: Option<String>) -> Option<String> {
    raw.filter(|p| !p.is_empty() && p != NOT_AVAILABLE)
}

fn parse_rating(raw: Option<&str>) -> f64 {
    raw.and_then(|r| r.trim().parse::<f64>().ok())
        .filter(|r| r.is_finite())
        .unwrap_or(0.0)
}

fn redact_key(url: &str) -> String {
    match url.split_once("apikey=") {
        Some((head, tail)) => {
            let rest = tail.split_once('&').map(|(_, r)| r).unwrap_or("");
            format!("{head}apikey=***&{rest}")
        }
        None => url.to_string(),
    }
}
