use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use marquee::app::{build_router, AppState};
use marquee::auth::{SessionSigner, UserDirectory};
use marquee::error::CatalogError;
use marquee::favorites::FAVORITES_KEY;
use marquee::models::{Movie, FALLBACK_POSTER_URL};
use marquee::omdb::CatalogApi;
use marquee::storage::{KeyValueStorage, MemoryStorage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

const DEBOUNCE: Duration = Duration::from_millis(20);

#[derive(Default)]
struct FakeCatalog {
    pages: HashMap<(String, u32), Vec<Movie>>,
    details: HashMap<String, Movie>,
    searches: Mutex<Vec<(String, u32)>>,
}

#[async_trait::async_trait]
impl CatalogApi for FakeCatalog {
    async fn search_movies(&self, query: &str, page: u32) -> Result<Vec<Movie>, CatalogError> {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), page));
        Ok(self
            .pages
            .get(&(query.to_string(), page))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_movie_by_id(&self, id: &str) -> Result<Option<Movie>, CatalogError> {
        if id == "tt-broken" {
            return Err(CatalogError::MalformedResponse("detail: missing Title".to_string()));
        }
        Ok(self.details.get(id).cloned())
    }
}

fn movie(id: &str, poster: Option<&str>) -> Movie {
    Movie {
        id: id.to_string(),
        title: format!("Title {id}"),
        poster_path: poster.map(str::to_string),
        vote_average: 7.5,
        release_date: "2008".to_string(),
        overview: "Overview".to_string(),
    }
}

fn page(ids: &[&str]) -> Vec<Movie> {
    ids.iter().map(|id| movie(id, None)).collect()
}

fn catalog() -> FakeCatalog {
    let mut pages = HashMap::new();
    pages.insert((String::new(), 1), page(&["p1", "p2"]));
    pages.insert(
        ("batman".to_string(), 1),
        page(&["b1", "b2", "b3", "b4", "b5"]),
    );
    pages.insert(("batman".to_string(), 2), page(&["b6", "b7"]));
    let mut details = HashMap::new();
    details.insert(
        "tt0468569".to_string(),
        movie("tt0468569", Some("https://img.example/dk.jpg")),
    );
    details.insert("tt0000001".to_string(), movie("tt0000001", None));
    FakeCatalog {
        pages,
        details,
        searches: Mutex::new(Vec::new()),
    }
}

fn app_with(catalog: FakeCatalog) -> (Router, Arc<MemoryStorage>, Arc<FakeCatalog>) {
    let storage = Arc::new(MemoryStorage::new());
    let catalog = Arc::new(catalog);
    let state = AppState::new(
        catalog.clone(),
        storage.clone(),
        SessionSigner::new("test-secret").unwrap(),
        UserDirectory::demo(),
        DEBOUNCE,
    );
    (build_router(state), storage, catalog)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(path);
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn with_json(method: &str, path: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn login(app: &Router) -> String {
    let (status, body) = send(
        app,
        with_json(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "user@example.com", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Explorer");
    body["token"].as_str().unwrap().to_string()
}

/// Polls the listing until `done` holds or two seconds pass.
async fn wait_for_listing(app: &Router, token: &str, done: impl Fn(&Value) -> bool) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let (status, view) = send(app, get("/api/listing", Some(token))).await;
        assert_eq!(status, StatusCode::OK);
        if done(&view) {
            return view;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for listing, last view: {view}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn item_ids(view: &Value) -> Vec<String> {
    view["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_is_open() {
    let (app, _, _) = app_with(catalog());
    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn gated_routes_require_a_session() {
    let (app, _, _) = app_with(catalog());
    for path in ["/api/listing", "/api/favorites", "/api/movies/tt0468569", "/api/theme"] {
        let (status, body) = send(&app, get(path, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(body["error"], "Unauthorized");
    }
    let (status, _) = send(&app, get("/api/listing", Some("1.99999999999.0.deadbeef"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_and_session_status() {
    let (app, _, _) = app_with(catalog());
    let (status, body) = send(&app, get("/api/session", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unauthenticated");

    let (status, _) = send(
        &app,
        with_json(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "user@example.com", "password": "nope" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = login(&app).await;
    let (_, body) = send(&app, get("/api/session", Some(&token))).await;
    assert_eq!(body["status"], "authenticated");
    assert_eq!(body["user"]["email"], "user@example.com");
}

#[tokio::test]
async fn logout_invalidates_token() {
    let (app, _, _) = app_with(catalog());
    let token = login(&app).await;
    let (status, _) = send(&app, with_json("POST", "/api/auth/logout", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, get("/api/favorites", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn search_and_paginate() {
    let (app, _, catalog) = app_with(catalog());
    let token = login(&app).await;

    // Sign-in loads the default listing.
    let view = wait_for_listing(&app, &token, |v| v["items"].as_array().unwrap().len() == 2).await;
    assert_eq!(item_ids(&view), vec!["p1", "p2"]);

    let (status, _) = send(
        &app,
        with_json("PUT", "/api/listing/query", Some(&token), json!({ "query": "batman" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let view = wait_for_listing(&app, &token, |v| {
        v["query"] == "batman" && !v["loading"].as_bool().unwrap() && item_ids(v).first().map(String::as_str) == Some("b1")
    })
    .await;
    assert_eq!(view["items"].as_array().unwrap().len(), 5);
    assert_eq!(view["page"], 1);
    assert_eq!(view["has_more"], true);

    let (status, _) = send(&app, with_json("POST", "/api/listing/more", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let view = wait_for_listing(&app, &token, |v| !v["loading"].as_bool().unwrap()).await;
    assert_eq!(
        item_ids(&view),
        vec!["b1", "b2", "b3", "b4", "b5", "b6", "b7"]
    );
    assert_eq!(view["page"], 2);

    // Page 3 is empty, which ends pagination.
    send(&app, with_json("POST", "/api/listing/more", Some(&token), json!({}))).await;
    let view = wait_for_listing(&app, &token, |v| v["has_more"] == false).await;
    assert_eq!(view["items"].as_array().unwrap().len(), 7);
    assert_eq!(view["can_load_more"], false);

    let searches_before = catalog.searches.lock().unwrap().len();
    let (status, body) = send(&app, with_json("POST", "/api/listing/more", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().starts_with("Conflict"));
    assert_eq!(catalog.searches.lock().unwrap().len(), searches_before);
}

#[tokio::test]
async fn movie_detail_and_not_found() {
    let (app, _, _) = app_with(catalog());
    let token = login(&app).await;

    let (status, body) = send(&app, get("/api/movies/tt0468569", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "tt0468569");
    assert_eq!(body["poster_url"], "https://img.example/dk.jpg");
    assert_eq!(body["favorite"], false);
    assert_eq!(body["vote_average"], 7.5);

    let (_, body) = send(&app, get("/api/movies/tt0000001", Some(&token))).await;
    assert_eq!(body["poster_url"], FALLBACK_POSTER_URL);
    assert_eq!(body["poster_path"], Value::Null);

    let (status, _) = send(&app, get("/api/movies/tt9999999", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, get("/api/movies/tt-broken", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn favorites_toggle_round_trip() {
    let (app, storage, _) = app_with(catalog());
    let token = login(&app).await;
    let stub = json!({ "id": "tt1", "title": "X", "poster_path": null });

    let (status, body) = send(&app, with_json("POST", "/api/favorites/toggle", Some(&token), stub.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["favorite"], true);

    let (_, list) = send(&app, get("/api/favorites", Some(&token))).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], "tt1");
    assert_eq!(list[0]["poster_url"], FALLBACK_POSTER_URL);

    let (_, status_body) = send(&app, get("/api/favorites/tt1", Some(&token))).await;
    assert_eq!(status_body["favorite"], true);
    let persisted = storage.get(FAVORITES_KEY).unwrap().unwrap();
    assert!(persisted.contains("\"tt1\""));

    let (_, body) = send(&app, with_json("POST", "/api/favorites/toggle", Some(&token), stub)).await;
    assert_eq!(body["favorite"], false);
    let (_, list) = send(&app, get("/api/favorites", Some(&token))).await;
    assert!(list.as_array().unwrap().is_empty());
    assert_eq!(storage.get(FAVORITES_KEY).unwrap().as_deref(), Some("[]"));
}

#[tokio::test]
async fn favorite_without_id_is_rejected() {
    let (app, _, _) = app_with(catalog());
    let token = login(&app).await;
    let (status, _) = send(
        &app,
        with_json(
            "POST",
            "/api/favorites/toggle",
            Some(&token),
            json!({ "id": " ", "title": "X", "poster_path": null }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detail_reports_favorite_state() {
    let (app, _, _) = app_with(catalog());
    let token = login(&app).await;
    let (_, detail) = send(&app, get("/api/movies/tt0468569", Some(&token))).await;
    assert_eq!(
        detail["favorite_stub"],
        json!({
            "id": "tt0468569",
            "title": "Title tt0468569",
            "poster_path": "https://img.example/dk.jpg",
        })
    );

    let (status, body) = send(
        &app,
        with_json("POST", "/api/favorites/toggle", Some(&token), detail["favorite_stub"].clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["favorite"], true);

    let (_, body) = send(&app, get("/api/movies/tt0468569", Some(&token))).await;
    assert_eq!(body["favorite"], true);
    let (_, list) = send(&app, get("/api/favorites", Some(&token))).await;
    assert_eq!(list[0]["poster_url"], "https://img.example/dk.jpg");
}

#[tokio::test]
async fn restored_session_loads_default_listing() {
    let (app, _, catalog) = app_with(catalog());
    // Token from an earlier run signed with the same secret; no sign-in on this app.
    let user = UserDirectory::demo()
        .authorize("user@example.com", "password123")
        .unwrap();
    let token = SessionSigner::new("test-secret")
        .unwrap()
        .issue(&user, Utc::now());

    // Whether or not page 1 has landed yet, load-more never jumps ahead of it.
    send(&app, with_json("POST", "/api/listing/more", Some(&token), json!({}))).await;

    let view = wait_for_listing(&app, &token, |v| !v["loading"].as_bool().unwrap() && item_ids(v).len() == 2).await;
    assert_eq!(item_ids(&view), vec!["p1", "p2"]);
    assert_eq!(view["query"], "");
    let searches = catalog.searches.lock().unwrap().clone();
    assert_eq!(searches.first(), Some(&(String::new(), 1)));
}

#[tokio::test]
async fn theme_toggles() {
    let (app, _, _) = app_with(catalog());
    let token = login(&app).await;
    let (_, body) = send(&app, get("/api/theme", Some(&token))).await;
    assert_eq!(body["theme"], "dark");
    let (_, body) = send(&app, with_json("POST", "/api/theme/toggle", Some(&token), json!({}))).await;
    assert_eq!(body["theme"], "light");
}
