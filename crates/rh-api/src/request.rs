//! Fetch lifecycle shared by the release health orchestrators.
//!
//! A [`Request`] owns one [`Loader`] and publishes its progress as
//! [`RequestState`] snapshots on a watch channel. Every fetch takes a
//! request id; only the latest fetch may commit, so a slow response for
//! old parameters never overwrites newer data.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::client::{ApiError, SessionsApi};

/// Snapshot of an orchestrator, handed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    /// First fetch in flight, nothing to show yet.
    pub loading: bool,
    /// Refetch in flight; `data` still holds the previous result.
    pub reloading: bool,
    pub errored: bool,
    pub data: Option<T>,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            loading: false,
            reloading: false,
            errored: false,
            data: None,
        }
    }
}

impl<T> RequestState<T> {
    /// No fetch has been started yet.
    pub const fn is_idle(&self) -> bool {
        !self.loading && !self.reloading && !self.errored && self.data.is_none()
    }
}

/// Receives user-facing error messages.
pub trait ErrorNotifier: Send + Sync {
    fn notify(&self, message: &str);

    /// Called once per failed fetch with the underlying error.
    ///
    /// Defaults to [`ErrorNotifier::notify`] with the message alone.
    fn notify_failure(&self, message: &str, error: &ApiError) {
        let _ = error;
        self.notify(message);
    }
}

/// Notifier that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl ErrorNotifier for TracingNotifier {
    fn notify(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// The fetch-and-derive step of an orchestrator.
pub trait Loader: Send + Sync + 'static {
    /// Inputs; a fetch is only issued when these change.
    type Params: Clone + PartialEq + fmt::Debug + Send + Sync;
    /// Derived result.
    type Output: Clone + Send + Sync;

    /// Name used in logs.
    const NAME: &'static str;
    /// Message handed to the [`ErrorNotifier`] when a fetch fails.
    const ERROR_MESSAGE: &'static str;

    fn load<A: SessionsApi>(
        api: &A,
        params: &Self::Params,
    ) -> impl Future<Output = Result<Self::Output, ApiError>> + Send;
}

/// A data request with an observable lifecycle.
///
/// States move idle → loading (or reloading when data exists) → loaded or
/// errored. Failures clear the data and notify once; there is no retry.
pub struct Request<A, L: Loader> {
    api: A,
    params: Mutex<Option<L::Params>>,
    latest: AtomicU64,
    unmounted: AtomicBool,
    state: watch::Sender<RequestState<L::Output>>,
    notifier: Arc<dyn ErrorNotifier>,
}

impl<A, L: Loader> fmt::Debug for Request<A, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("loader", &L::NAME)
            .field("latest", &self.latest.load(Ordering::SeqCst))
            .field("unmounted", &self.unmounted.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<A: SessionsApi, L: Loader> Request<A, L> {
    /// Creates a request that reports errors through `tracing`.
    pub fn new(api: A) -> Self {
        Self::with_notifier(api, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(api: A, notifier: Arc<dyn ErrorNotifier>) -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            api,
            params: Mutex::new(None),
            latest: AtomicU64::new(0),
            unmounted: AtomicBool::new(false),
            state,
            notifier,
        }
    }

    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<RequestState<L::Output>> {
        self.state.subscribe()
    }

    /// Current state snapshot.
    pub fn state(&self) -> RequestState<L::Output> {
        self.state.borrow().clone()
    }

    /// Fetches for `params` unless they equal the last requested params.
    ///
    /// Returns `true` if a fetch ran and its result was committed.
    pub async fn update(&self, params: L::Params) -> bool {
        {
            let mut last = self.params.lock().unwrap_or_else(PoisonError::into_inner);
            if last.as_ref() == Some(&params) {
                tracing::debug!(request = L::NAME, "params unchanged, skipping fetch");
                return false;
            }
            *last = Some(params.clone());
        }
        self.run(&params).await
    }

    /// Fetches again with the last requested params.
    pub async fn refetch(&self) -> bool {
        let params = self
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match params {
            Some(params) => self.run(&params).await,
            None => false,
        }
    }

    /// Stops committing results. Fetches in flight still complete.
    pub fn unmount(&self) {
        self.unmounted.store(true, Ordering::SeqCst);
    }

    async fn run(&self, params: &L::Params) -> bool {
        let id = self.begin();
        tracing::debug!(request = L::NAME, id, ?params, "fetch started");
        let result = L::load(&self.api, params).await;
        self.commit(id, result)
    }

    fn begin(&self) -> u64 {
        let mut id = 0;
        self.state.send_if_modified(|state| {
            id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
            if self.unmounted.load(Ordering::SeqCst) {
                return false;
            }
            let has_data = state.data.is_some();
            state.loading = !has_data;
            state.reloading = has_data;
            state.errored = false;
            true
        });
        id
    }

    fn commit(&self, id: u64, result: Result<L::Output, ApiError>) -> bool {
        let (next, failed) = match result {
            Ok(data) => (
                RequestState {
                    data: Some(data),
                    ..RequestState::default()
                },
                None,
            ),
            Err(error) => (
                RequestState {
                    errored: true,
                    ..RequestState::default()
                },
                Some(error),
            ),
        };

        let committed = self.state.send_if_modified(|state| {
            if self.unmounted.load(Ordering::SeqCst) || self.latest.load(Ordering::SeqCst) != id {
                return false;
            }
            *state = next;
            true
        });

        if !committed {
            tracing::debug!(request = L::NAME, id, "discarding stale response");
            return false;
        }
        if let Some(error) = failed {
            tracing::warn!(request = L::NAME, id, %error, "fetch failed");
            self.notifier.notify_failure(L::ERROR_MESSAGE, &error);
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use rh_core::SessionApiResponse;

    use super::ErrorNotifier;
    use crate::client::{ApiError, SessionsApi};
    use crate::query::SessionsQuery;

    type Handler = dyn Fn(&SessionsQuery) -> Result<SessionApiResponse, ApiError> + Send + Sync;

    /// In-memory sessions API answering through a handler closure.
    pub(crate) struct FakeApi {
        handler: Box<Handler>,
        pub(crate) calls: Mutex<Vec<SessionsQuery>>,
    }

    impl FakeApi {
        pub(crate) fn new(
            handler: impl Fn(&SessionsQuery) -> Result<SessionApiResponse, ApiError>
            + Send
            + Sync
            + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl SessionsApi for FakeApi {
        async fn fetch_sessions(
            &self,
            query: &SessionsQuery,
        ) -> Result<SessionApiResponse, ApiError> {
            self.calls.lock().unwrap().push(query.clone());
            (self.handler)(query)
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) messages: Mutex<Vec<String>>,
    }

    impl ErrorNotifier for RecordingNotifier {
        fn notify(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    pub(crate) fn json(body: &str) -> SessionApiResponse {
        serde_json::from_str(body).unwrap()
    }
}
