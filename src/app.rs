use crate::auth::{SessionContext, SessionSigner, User, UserDirectory};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::favorites::FavoritesStore;
use crate::listing::{ListingController, ListingView};
use crate::models::{FavoriteMovie, Movie};
use crate::omdb::{movie_or_none, CatalogApi, OmdbClient};
use crate::storage::{FileStorage, KeyValueStorage};
use crate::theme::{Theme, ThemePreference};
use anyhow::Result;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogApi>,
    pub listing: ListingController,
    pub favorites: Arc<Mutex<FavoritesStore>>,
    pub theme: Arc<Mutex<ThemePreference>>,
    pub signer: Arc<SessionSigner>,
    pub users: Arc<UserDirectory>,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        storage: Arc<dyn KeyValueStorage>,
        signer: SessionSigner,
        users: UserDirectory,
        debounce: Duration,
    ) -> Self {
        let listing = ListingController::new(catalog.clone(), debounce);
        listing.load_initial();
        Self {
            listing,
            catalog,
            favorites: Arc::new(Mutex::new(FavoritesStore::load(storage.clone()))),
            theme: Arc::new(Mutex::new(ThemePreference::load(storage))),
            signer: Arc::new(signer),
            users: Arc::new(users),
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::new(&config.data_dir));
    info!("Storing local data under {:?}", config.data_dir);

    let omdb = OmdbClient::new(config.omdb_api_key.clone(), config.omdb_base_url.clone());
    info!(
        "OMDb catalog at {} ({})",
        config.omdb_base_url,
        if omdb.has_api_key() { "api key set" } else { "no api key" }
    );
    let catalog: Arc<dyn CatalogApi> = Arc::new(omdb);
    let signer = SessionSigner::new(&config.session_secret)?;
    info!("{} user(s) can sign in", config.users.len());

    let state = AppState::new(catalog, storage, signer, config.users, config.debounce);
    let app = build_router(state);

    info!("Listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/session", get(session))
        .route("/api/listing", get(listing_view))
        .route("/api/listing/query", put(listing_query))
        .route("/api/listing/more", post(listing_more))
        .route("/api/movies/:id", get(movie_detail))
        .route("/api/favorites", get(favorites_list))
        .route("/api/favorites/toggle", post(favorites_toggle))
        .route("/api/favorites/:id", get(favorite_status))
        .route("/api/theme", get(theme_get))
        .route("/api/theme/toggle", post(theme_toggle))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Session resolved from the bearer token, whatever its outcome.
pub struct Session(pub SessionContext);

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let bearer = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok();
        let token = bearer.as_ref().map(|TypedHeader(auth)| auth.token());
        let ctx = SessionContext::new().resolve(token, &state.signer, &state.users, Utc::now());
        Ok(Session(ctx))
    }
}

/// Gate for every listing/favorites/theme route.
pub struct Authenticated(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Session(ctx) = match Session::from_request_parts(parts, state).await {
            Ok(session) => session,
            Err(never) => match never {},
        };
        ctx.user()
            .cloned()
            .map(Authenticated)
            .ok_or(AppError::Unauthorized)
    }
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user: User,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let Some(user) = state.users.authorize(&req.email, &req.password) else {
        warn!("Failed sign-in attempt");
        return Err(AppError::Unauthorized);
    };
    let token = state.signer.issue(&user, Utc::now());
    info!("User {} signed in", user.id);
    // Fresh session starts on the default listing.
    state.listing.set_query(String::new()).await;
    Ok(Json(LoginResponse { token, user }))
}

async fn logout(State(state): State<AppState>, Authenticated(user): Authenticated) -> StatusCode {
    state.signer.sign_out();
    info!("User {} signed out", user.id);
    StatusCode::NO_CONTENT
}

async fn session(Session(ctx): Session) -> Json<Value> {
    Json(json!(ctx.view()))
}

async fn listing_view(
    State(state): State<AppState>,
    _user: Authenticated,
) -> Json<ListingView> {
    Json(state.listing.view().await)
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: String,
}

async fn listing_query(
    State(state): State<AppState>,
    _user: Authenticated,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ListingView>) {
    state.listing.set_query(req.query).await;
    (StatusCode::ACCEPTED, Json(state.listing.view().await))
}

async fn listing_more(
    State(state): State<AppState>,
    _user: Authenticated,
) -> AppResult<(StatusCode, Json<ListingView>)> {
    let Some(request) = state.listing.begin_load_more().await else {
        return Err(AppError::Conflict(
            "no further pages, a fetch is running or a query is pending".to_string(),
        ));
    };
    let listing = state.listing.clone();
    tokio::spawn(async move {
        listing.fetch_and_apply(request).await;
    });
    Ok((StatusCode::ACCEPTED, Json(state.listing.view().await)))
}

#[derive(Debug, Serialize)]
struct MovieDetail {
    #[serde(flatten)]
    movie: Movie,
    poster_url: String,
    favorite: bool,
    /// Body for `POST /api/favorites/toggle`.
    favorite_stub: FavoriteMovie,
}

async fn movie_detail(
    State(state): State<AppState>,
    _user: Authenticated,
    Path(id): Path<String>,
) -> AppResult<Json<MovieDetail>> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::NotFound("empty movie id".to_string()));
    }
    let movie = movie_or_none(state.catalog.as_ref(), id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("movie {id}")))?;
    let favorite = state.favorites.lock().await.is_favorite(&movie.id);
    Ok(Json(MovieDetail {
        poster_url: movie.poster_url().to_string(),
        favorite_stub: movie.favorite_stub(),
        movie,
        favorite,
    }))
}

#[derive(Debug, Serialize)]
struct FavoriteCard {
    #[serde(flatten)]
    movie: FavoriteMovie,
    poster_url: String,
}

async fn favorites_list(
    State(state): State<AppState>,
    _user: Authenticated,
) -> Json<Vec<FavoriteCard>> {
    let favorites = state.favorites.lock().await;
    let cards = favorites
        .list()
        .iter()
        .map(|m| FavoriteCard {
            poster_url: m.poster_url().to_string(),
            movie: m.clone(),
        })
        .collect();
    Json(cards)
}

async fn favorite_status(
    State(state): State<AppState>,
    _user: Authenticated,
    Path(id): Path<String>,
) -> Json<Value> {
    let favorite = state.favorites.lock().await.is_favorite(&id);
    Json(json!({ "id": id, "favorite": favorite }))
}

async fn favorites_toggle(
    State(state): State<AppState>,
    _user: Authenticated,
    Json(movie): Json<FavoriteMovie>,
) -> AppResult<Json<Value>> {
    if movie.id.trim().is_empty() {
        return Err(AppError::InvalidInput("favorite needs an id".to_string()));
    }
    let id = movie.id.clone();
    let favorite = state.favorites.lock().await.toggle(movie);
    Ok(Json(json!({ "id": id, "favorite": favorite })))
}

async fn theme_get(State(state): State<AppState>, _user: Authenticated) -> Json<Value> {
    let theme: Theme = state.theme.lock().await.current();
    Json(json!({ "theme": theme }))
}

async fn theme_toggle(State(state): State<AppState>, _user: Authenticated) -> Json<Value> {
    let theme = state.theme.lock().await.toggle();
    Json(json!({ "theme": theme }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
