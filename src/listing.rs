//! Debounced, paginated movie listing.
//!
//! Query changes wait out the debounce window before page 1 is requested and
//! replace the list; "load more" appends the next page. Every issued request is
//! tagged, and a response is applied only while its tag is still the one in
//! flight, so a slow stale response can never overwrite fresher results.
use crate::debounce::Debouncer;
use crate::models::Movie;
use crate::omdb::{search_or_empty, CatalogApi};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const FULL_PAGE_PLACEHOLDERS: usize = 12;
pub const TRAILING_PLACEHOLDERS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Replace,
    Append,
}

/// Identifies one issued page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub serial: u64,
    pub query: String,
    pub page: u32,
    pub mode: FetchMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum Placeholder {
    None,
    FullPage(usize),
    Trailing(usize),
}

/// Snapshot handed to whatever renders the movie grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingView {
    pub query: String,
    pub page: u32,
    pub has_more: bool,
    pub loading: bool,
    pub can_load_more: bool,
    pub placeholder: Placeholder,
    pub items: Vec<Movie>,
}

#[derive(Debug)]
struct ListingState {
    /// Latest query typed by the user.
    query: String,
    /// Query whose results are currently in `items`.
    shown_query: String,
    page: u32,
    has_more: bool,
    items: Vec<Movie>,
    in_flight: Option<PageRequest>,
    /// Set while a query is waiting out the debounce and its page 1 has not been issued.
    awaiting_query: bool,
    query_generation: u64,
    next_serial: u64,
}

impl ListingState {
    fn issue(&mut self, query: String, page: u32, mode: FetchMode) -> PageRequest {
        self.next_serial += 1;
        let request = PageRequest {
            serial: self.next_serial,
            query,
            page,
            mode,
        };
        if mode == FetchMode::Replace {
            self.awaiting_query = false;
        }
        self.in_flight = Some(request.clone());
        request
    }

    fn view(&self) -> ListingView {
        let loading = self.in_flight.is_some();
        let placeholder = match &self.in_flight {
            Some(_) if self.items.is_empty() => Placeholder::FullPage(FULL_PAGE_PLACEHOLDERS),
            Some(req) if req.mode == FetchMode::Append => {
                Placeholder::Trailing(TRAILING_PLACEHOLDERS)
            }
            _ => Placeholder::None,
        };
        ListingView {
            query: self.query.clone(),
            page: self.page,
            has_more: self.has_more,
            loading,
            can_load_more: self.has_more && !loading && !self.awaiting_query,
            placeholder,
            items: self.items.clone(),
        }
    }
}

struct Shared {
    catalog: Arc<dyn CatalogApi>,
    state: Mutex<ListingState>,
    debouncer: Debouncer,
}

#[derive(Clone)]
pub struct ListingController {
    shared: Arc<Shared>,
}

impl ListingController {
    pub fn new(catalog: Arc<dyn CatalogApi>, debounce: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog,
                state: Mutex::new(ListingState {
                    query: String::new(),
                    shown_query: String::new(),
                    page: 1,
                    has_more: true,
                    items: Vec::new(),
                    in_flight: None,
                    awaiting_query: true,
                    query_generation: 0,
                    next_serial: 0,
                }),
                debouncer: Debouncer::new(debounce),
            }),
        }
    }

    /// Schedules the default listing, the way a freshly mounted page loads it.
    pub fn load_initial(&self) {
        self.schedule_query(0);
    }

    pub async fn view(&self) -> ListingView {
        self.shared.state.lock().await.view()
    }

    /// Records a new query and schedules the page 1 fetch after the debounce window.
    /// Anything still in flight for the previous query is invalidated right away.
    pub async fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        let generation = {
            let mut state = self.shared.state.lock().await;
            state.query = query.clone();
            state.query_generation += 1;
            state.in_flight = None;
            state.awaiting_query = true;
            state.page = 1;
            state.query_generation
        };
        debug!(
            "Query set to '{}' (generation {}), waiting {:?}",
            query,
            generation,
            self.shared.debouncer.delay()
        );
        self.schedule_query(generation);
    }

    fn schedule_query(&self, generation: u64) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared.debouncer.schedule(async move {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let controller = ListingController { shared };
            if let Some(request) = controller.begin_query(generation).await {
                controller.fetch_and_apply(request).await;
            }
        });
    }

    async fn begin_query(&self, generation: u64) -> Option<PageRequest> {
        let mut state = self.shared.state.lock().await;
        if state.query_generation != generation {
            return None;
        }
        state.page = 1;
        state.has_more = true;
        let query = state.query.clone();
        Some(state.issue(query, 1, FetchMode::Replace))
    }

    /// Claims the next page. Returns `None` when the listing is exhausted, a
    /// fetch is already running, or page 1 of the current query is still pending.
    pub async fn begin_load_more(&self) -> Option<PageRequest> {
        let mut state = self.shared.state.lock().await;
        if !state.has_more || state.in_flight.is_some() || state.awaiting_query {
            return None;
        }
        state.page += 1;
        let (query, page) = (state.shown_query.clone(), state.page);
        Some(state.issue(query, page, FetchMode::Append))
    }

    /// Claims and fetches the next page in one go. Returns whether a fetch ran.
    pub async fn load_more(&self) -> bool {
        match self.begin_load_more().await {
            Some(request) => {
                self.fetch_and_apply(request).await;
                true
            }
            None => false,
        }
    }

    pub async fn fetch_and_apply(&self, request: PageRequest) {
        let results = search_or_empty(self.shared.catalog.as_ref(), &request.query, request.page).await;
        self.apply(request, results).await;
    }

    /// Merges a page into the listing. Returns false when the response was stale and dropped.
    pub async fn apply(&self, request: PageRequest, results: Vec<Movie>) -> bool {
        let mut state = self.shared.state.lock().await;
        if state.in_flight.as_ref() != Some(&request) {
            debug!(
                "Discarding stale page {} for '{}' (request {})",
                request.page, request.query, request.serial
            );
            return false;
        }
        state.in_flight = None;
        if results.is_empty() {
            state.has_more = false;
        }
        let received = results.len();
        match request.mode {
            FetchMode::Replace => {
                state.items = results;
                state.shown_query = request.query;
            }
            FetchMode::Append => state.items.extend(results),
        }
        info!(
            "Listing '{}' page {}: {} new, {} total",
            state.shown_query,
            request.page,
            received,
            state.items.len()
        );
        true
    }
}
