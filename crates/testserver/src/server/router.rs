//! The embedded axum router, swappable while the server is running.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use axum::{body::Body, Router};
use hyper::{body::Incoming, Request, Response};
use tower::{util::Oneshot, ServiceExt};
use tower_http::trace::TraceLayer;

/// Routes registered on a server.
///
/// Writers edit the un-layered router under a lock and publish a traced copy;
/// each request clones whichever published snapshot is current when it
/// arrives, so registration after start takes effect for later requests.
#[derive(Debug)]
pub(crate) struct SharedRouter {
    base: Mutex<Router>,
    served: ArcSwap<Router>,
}

impl SharedRouter {
    pub(crate) fn new() -> Arc<Self> {
        let base = Router::new();
        Arc::new(Self {
            served: ArcSwap::from_pointee(with_tracing(base.clone())),
            base: Mutex::new(base),
        })
    }

    /// Apply `edit` to the router and publish the result.
    pub(crate) fn update(&self, edit: impl FnOnce(Router) -> Router) {
        let mut base = self.base.lock().unwrap_or_else(PoisonError::into_inner);
        let next = edit(base.clone());
        self.served.store(Arc::new(with_tracing(next.clone())));
        *base = next;
    }

    pub(crate) fn service(self: &Arc<Self>) -> RouterService {
        RouterService {
            routes: Arc::clone(self),
        }
    }
}

fn with_tracing(router: Router) -> Router {
    router.layer(TraceLayer::new_for_http())
}

/// hyper service that dispatches each request to the current router snapshot.
#[derive(Debug, Clone)]
pub(crate) struct RouterService {
    routes: Arc<SharedRouter>,
}

impl hyper::service::Service<Request<Incoming>> for RouterService {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Oneshot<Router, Request<Incoming>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let router = Router::clone(&self.routes.served.load());
        router.oneshot(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get};

    async fn status_of(routes: &SharedRouter, uri: &str) -> StatusCode {
        let router = Router::clone(&routes.served.load());
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn empty_router_is_404() {
        let routes = SharedRouter::new();
        assert_eq!(status_of(&routes, "/anything").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_publishes_new_routes() {
        let routes = SharedRouter::new();
        routes.update(|r| r.route("/a", get(|| async { "a" })));
        assert_eq!(status_of(&routes, "/a").await, StatusCode::OK);

        routes.update(|r| r.route("/b", get(|| async { "b" })));
        assert_eq!(status_of(&routes, "/a").await, StatusCode::OK);
        assert_eq!(status_of(&routes, "/b").await, StatusCode::OK);
    }
}
