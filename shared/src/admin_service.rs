use crate::http::{make_boxed_error_response, make_boxed_response};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

/// Result of a readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(String),
}

/// Serves `/health` and `/ready` on the admin listener.
///
/// `/health` only reports that the process is up. `/ready` asks the supplied
/// probe on every call, so it reflects the current state of whatever the
/// service depends on.
pub struct AdminService<F> {
    readiness: F,
}

impl<F> AdminService<F>
where
    F: Fn() -> Readiness,
{
    pub fn new(readiness: F) -> Self {
        Self { readiness }
    }
}

impl<F> Service<Request<Incoming>> for AdminService<F>
where
    F: Fn() -> Readiness + Send + Sync + 'static,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let response = route(req.uri().path(), || (self.readiness)());
        Box::pin(async move { Ok(response) })
    }
}

fn route(
    path: &str,
    readiness: impl FnOnce() -> Readiness,
) -> Response<BoxBody<Bytes, Infallible>> {
    match path {
        "/health" => make_boxed_response(StatusCode::OK, "ok\n"),
        "/ready" => match readiness() {
            Readiness::Ready => make_boxed_response(StatusCode::OK, "ok\n"),
            Readiness::NotReady(reason) => {
                tracing::debug!(%reason, "Readiness probe failed");
                make_boxed_response(StatusCode::SERVICE_UNAVAILABLE, format!("{reason}\n"))
            }
        },
        _ => make_boxed_error_response(StatusCode::NOT_FOUND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{bind, run_http_service};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_route() {
        assert_eq!(
            route("/health", || Readiness::NotReady("x".into())).status(),
            StatusCode::OK
        );
        assert_eq!(route("/ready", || Readiness::Ready).status(), StatusCode::OK);
        assert_eq!(
            route("/ready", || Readiness::NotReady("breaker open".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            route("/other", || Readiness::Ready).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_admin_service_over_tcp() {
        let ready = Arc::new(AtomicBool::new(false));
        let probe = ready.clone();
        let service = AdminService::new(move || {
            if probe.load(Ordering::Relaxed) {
                Readiness::Ready
            } else {
                Readiness::NotReady("warming up".into())
            }
        });

        let listener = bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(run_http_service(listener, service, async {
            let _ = rx.await;
        }));

        let client = reqwest::Client::new();
        let health = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(health.status(), 200);

        let not_ready = client
            .get(format!("http://{addr}/ready"))
            .send()
            .await
            .unwrap();
        assert_eq!(not_ready.status(), 503);
        assert_eq!(not_ready.text().await.unwrap(), "warming up\n");

        ready.store(true, Ordering::Relaxed);
        let is_ready = client
            .get(format!("http://{addr}/ready"))
            .send()
            .await
            .unwrap();
        assert_eq!(is_ready.status(), 200);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
