//! Paged, sorted, filtered listing of liveries.
//!
//! The engine owns the six listing parameters and the last page it loaded.
//! Every parameter change issues one count+page request; when changes overlap,
//! only the response to the latest request is applied.
//!
//! `params` moves ahead of the data as soon as a change is made. The rows
//! and count on screen belong to `loaded_params`, which only advances when a
//! load succeeds.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use aerohub_gateway::Gateway;
use aerohub_types::listing::{self, ListingParams, PageSize, SortField, SortOrder};
use aerohub_types::models::Livery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Errored,
}

/// Everything a listing view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingSnapshot {
    /// Parameters of the latest request.
    pub params: ListingParams,
    /// Parameters `items` and `total_count` were loaded with. `None` until
    /// the first successful load.
    pub loaded_params: Option<ListingParams>,
    /// Rows of the last successful load. Kept while a reload is in flight
    /// or after it fails.
    pub items: Vec<Livery>,
    pub total_count: u64,
    pub status: LoadStatus,
    pub error: Option<String>,
}

impl ListingSnapshot {
    pub fn total_pages(&self) -> u64 {
        let page_size = self
            .loaded_params
            .as_ref()
            .map_or(self.params.page_size, |loaded| loaded.page_size);
        listing::total_pages(self.total_count, page_size)
    }

    pub fn has_previous(&self) -> bool {
        self.params.page > 1
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.params.page) < self.total_pages()
    }

    /// Highest page `set_page` accepts. Page 1 is always valid, even for an
    /// empty listing. While a filter, sort or size change is still loading
    /// the count is stale, so nothing past page 1 is.
    fn last_page(&self) -> u64 {
        if self.counts_current_query() {
            self.total_pages().max(1)
        } else {
            1
        }
    }

    fn accepts_page(&self, page: u32) -> bool {
        page >= 1 && u64::from(page) <= self.last_page()
    }

    /// Whether `total_count` was counted under the current filter and page
    /// size. The page number itself does not affect the count.
    fn counts_current_query(&self) -> bool {
        self.loaded_params
            .as_ref()
            .is_some_and(|loaded| same_query(loaded, &self.params))
    }
}

fn same_query(a: &ListingParams, b: &ListingParams) -> bool {
    ListingParams { page: 1, ..a.clone() } == ListingParams { page: 1, ..b.clone() }
}

struct ListingState {
    snapshot: ListingSnapshot,
    /// Bumped for every request; only the newest response is applied.
    generation: u64,
}

pub struct ListingEngine<G: Gateway + ?Sized> {
    gateway: Arc<G>,
    state: Mutex<ListingState>,
}

impl<G: Gateway + ?Sized> ListingEngine<G> {
    /// An idle engine. Nothing is fetched until the first change or
    /// [`refresh`](Self::refresh).
    pub fn new(gateway: Arc<G>, params: ListingParams) -> Self {
        Self {
            gateway,
            state: Mutex::new(ListingState {
                snapshot: ListingSnapshot {
                    params,
                    loaded_params: None,
                    items: Vec::new(),
                    total_count: 0,
                    status: LoadStatus::Idle,
                    error: None,
                },
                generation: 0,
            }),
        }
    }

    /// Restore a listing from its shared URL query.
    pub fn from_query_string(gateway: Arc<G>, query: &str) -> Self {
        Self::new(gateway, ListingParams::from_query_string(query))
    }

    pub async fn snapshot(&self) -> ListingSnapshot {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn params(&self) -> ListingParams {
        self.state.lock().await.snapshot.params.clone()
    }

    /// URL query mirroring the current parameters.
    pub async fn query_string(&self) -> String {
        self.state.lock().await.snapshot.params.to_query_string()
    }

    pub async fn total_pages(&self) -> u64 {
        self.state.lock().await.snapshot.total_pages()
    }

    pub async fn has_previous(&self) -> bool {
        self.state.lock().await.snapshot.has_previous()
    }

    pub async fn has_next(&self) -> bool {
        self.state.lock().await.snapshot.has_next()
    }

    // -- Parameter changes --

    /// Jump to `page`. Pages outside `1..=total_pages` are refused without a
    /// request.
    pub async fn set_page(&self, page: u32) -> bool {
        let request = {
            let mut state = self.state.lock().await;
            if !state.snapshot.accepts_page(page) {
                debug!(
                    "Ignoring page {} outside 1..={}",
                    page,
                    state.snapshot.last_page()
                );
                return false;
            }
            Self::begin(&mut state, |params| params.page = page)
        };
        self.dispatch(request).await
    }

    pub async fn next_page(&self) -> bool {
        let page = self.params().await.page.saturating_add(1);
        self.set_page(page).await
    }

    pub async fn previous_page(&self) -> bool {
        let page = self.params().await.page.saturating_sub(1);
        self.set_page(page).await
    }

    pub async fn set_page_size(&self, page_size: PageSize) -> bool {
        self.change(|params| {
            params.page_size = page_size;
            params.page = 1;
        })
        .await
    }

    pub async fn set_sort(&self, sort_by: SortField, sort_order: SortOrder) -> bool {
        self.change(|params| {
            params.sort_by = sort_by;
            params.sort_order = sort_order;
            params.page = 1;
        })
        .await
    }

    /// Filter by title. An empty or blank query clears the filter.
    pub async fn set_search(&self, query: &str) -> bool {
        let query = non_blank(query);
        self.change(|params| {
            params.search_query = query;
            params.page = 1;
        })
        .await
    }

    /// Filter by exact aircraft name. `None` or a blank name clears it.
    pub async fn set_aircraft_filter(&self, aircraft: Option<&str>) -> bool {
        let aircraft = aircraft.and_then(non_blank);
        self.change(|params| {
            params.aircraft_filter = aircraft;
            params.page = 1;
        })
        .await
    }

    /// Adopt the parameters of a URL query wholesale, e.g. on back/forward
    /// navigation.
    pub async fn apply_query_string(&self, query: &str) -> bool {
        let next = ListingParams::from_query_string(query);
        self.change(|params| *params = next).await
    }

    /// Re-issue the current query. Used for the first load and for retrying
    /// after an error.
    pub async fn refresh(&self) {
        let request = {
            let mut state = self.state.lock().await;
            Self::start(&mut state)
        };
        self.load(request).await;
    }

    // -- Loading --

    async fn change(&self, apply: impl FnOnce(&mut ListingParams)) -> bool {
        let request = {
            let mut state = self.state.lock().await;
            Self::begin(&mut state, apply)
        };
        self.dispatch(request).await
    }

    /// Apply `apply` to the parameters and start a request if they changed.
    fn begin(
        state: &mut ListingState,
        apply: impl FnOnce(&mut ListingParams),
    ) -> Option<(u64, ListingParams)> {
        let mut next = state.snapshot.params.clone();
        apply(&mut next);
        if next == state.snapshot.params {
            return None;
        }
        state.snapshot.params = next;
        Some(Self::start(state))
    }

    fn start(state: &mut ListingState) -> (u64, ListingParams) {
        state.generation += 1;
        state.snapshot.status = LoadStatus::Loading;
        state.snapshot.error = None;
        (state.generation, state.snapshot.params.clone())
    }

    async fn dispatch(&self, request: Option<(u64, ListingParams)>) -> bool {
        match request {
            Some(request) => {
                self.load(request).await;
                true
            }
            None => false,
        }
    }

    /// Run `request` and apply its response unless a newer one was issued.
    /// A page past the end (a restored URL, or rows deleted meanwhile) is
    /// clamped to the last page and fetched again.
    async fn load(&self, mut request: (u64, ListingParams)) {
        loop {
            let (generation, params) = request;
            let result = self
                .gateway
                .list_liveries(
                    &params.filter(),
                    params.sort(),
                    params.page,
                    params.page_size.get(),
                )
                .await;

            let mut state = self.state.lock().await;
            if state.generation != generation {
                debug!(
                    "Discarding stale listing response {} (current {})",
                    generation, state.generation
                );
                return;
            }

            match result {
                Ok(page) => {
                    let last = listing::total_pages(page.total_count, params.page_size).max(1);
                    if u64::from(params.page) > last {
                        debug!("Page {} is past the last page {}, clamping", params.page, last);
                        state.snapshot.params.page = u32::try_from(last).unwrap_or(u32::MAX);
                        request = Self::start(&mut state);
                        continue;
                    }
                    state.snapshot.items = page.items;
                    state.snapshot.total_count = page.total_count;
                    state.snapshot.loaded_params = Some(params);
                    state.snapshot.status = LoadStatus::Loaded;
                }
                Err(e) => {
                    warn!("Failed to load liveries ({}): {}", params.to_query_string(), e);
                    state.snapshot.status = LoadStatus::Errored;
                    state.snapshot.error = Some(e.to_string());
                }
            }
            return;
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
