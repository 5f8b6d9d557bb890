use http::StatusCode;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

type BoxError = Box<dyn StdError + Send + Sync>;

pub async fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(format!("{host}:{port}")).await
}

/// Accepts connections on `listener` and serves each one with `service` until
/// `shutdown` resolves. Connections already accepted keep running on their own
/// tasks.
pub async fn run_http_service<S, B, F>(
    listener: TcpListener,
    service: S,
    shutdown: F,
) -> std::io::Result<()>
where
    S: Service<Request<Incoming>, Response = Response<B>> + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    F: Future<Output = ()> + Send,
{
    let service_arc = Arc::new(service);
    tokio::pin!(shutdown);

    loop {
        let (stream, _peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => return Ok(()),
        };
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!("Connection closed with error: {e}");
            }
        });
    }
}

pub fn make_boxed_response(
    status: StatusCode,
    body: impl Into<Bytes>,
) -> Response<BoxBody<Bytes, Infallible>> {
    let mut response = Response::new(Full::new(body.into()).boxed());
    *response.status_mut() = status;
    response
}

pub fn make_boxed_error_response(status: StatusCode) -> Response<BoxBody<Bytes, Infallible>> {
    let reason = status.canonical_reason().unwrap_or("error");
    make_boxed_response(status, format!("{}\n", reason.to_lowercase()))
}
