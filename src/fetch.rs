//! Promise wrapper for network operations
//!
//! The runtime does not talk to the network itself. A [`Fetcher`] starts the
//! actual transfer wherever it likes (its own thread, an I/O loop) and reports
//! back through a [`Completer`]; this module turns that into a
//! `Promise<Bytes>` whose cancellation aborts the transfer.

use std::rc::Rc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};

use crate::context::{Completer, MainContext};
use crate::error::DomainError;
use crate::outcome::Outcome;
use crate::promise::Promise;

/// Errors produced by the fetch wrapper itself
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("fetch of {uri} finished with neither data nor an error")]
    EmptyResponse { uri: Uri },
}

/// Description of a request handed to a [`Fetcher`]
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: Uri, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, uri).with_body(body)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// What a [`Fetcher`] reports when a transfer ends
#[derive(Debug, Clone)]
pub enum FetchReply {
    Data(Bytes),
    Failed(DomainError),
    /// The transfer was aborted before it finished.
    Aborted,
    /// The transfer ended without data or an error.
    Empty,
}

impl FetchReply {
    fn into_outcome(self, uri: &Uri) -> Outcome<Bytes> {
        match self {
            FetchReply::Data(data) => Outcome::Ready(data),
            FetchReply::Failed(error) => Outcome::Failed(error),
            FetchReply::Aborted => Outcome::Cancelled,
            FetchReply::Empty => Outcome::Failed(DomainError::new(FetchError::EmptyResponse {
                uri: uri.clone(),
            })),
        }
    }
}

/// Stops a transfer that is still running
pub trait AbortHandle {
    fn abort(self: Box<Self>);
}

/// Starts transfers on behalf of the main context
pub trait Fetcher {
    /// Start `request` and report its end through `completer`.
    ///
    /// The returned handle is used at most once, to abort the transfer when
    /// the promise waiting on it is cancelled.
    fn fetch(&self, request: FetchRequest, completer: Completer<FetchReply>) -> Box<dyn AbortHandle>;
}

impl Promise<Bytes> {
    /// Start `request` through `fetcher` and conclude with the response body.
    ///
    /// Cancelling the returned promise aborts the transfer.
    pub fn fetch(cx: &MainContext, fetcher: &dyn Fetcher, request: FetchRequest) -> Promise<Bytes> {
        let promise = Promise::pending(cx);
        let resolver = promise.resolver(cx);
        let uri = request.uri.clone();
        tracing::debug!("{} fetching {} {}", promise.id(), request.method, uri);

        let completer = cx.completer(move |cx, reply: FetchReply| {
            resolver.resolve(cx, reply.into_outcome(&uri));
        });
        let handle = fetcher.fetch(request, completer);

        let id = promise.id();
        promise.on_cancel(cx, move |_| {
            tracing::debug!("{} cancelled, aborting transfer", id);
            handle.abort();
        });
        promise
    }
}

impl Promise<FetchRequest> {
    /// Fetch the request this promise produces.
    pub fn then_fetch(&self, cx: &MainContext, fetcher: Rc<dyn Fetcher>) -> Promise<Bytes> {
        self.and_then(cx, move |cx, request| Promise::<Bytes>::fetch(cx, fetcher.as_ref(), request))
    }
}
