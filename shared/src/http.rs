use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::{Service, service_fn};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Response body used by every service in the workspace.
pub type ServiceBody = BoxBody<Bytes, Infallible>;

/// Address of the peer that opened the connection a request arrived on.
///
/// Inserted into the request extensions by the accept loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectInfo(pub SocketAddr);

pub fn full_body(data: impl Into<Bytes>) -> ServiceBody {
    Full::new(data.into()).boxed()
}

/// The body is the canonical reason only, never anything request specific.
pub fn make_boxed_error_response(status_code: StatusCode) -> Response<ServiceBody> {
    let message = status_code
        .canonical_reason()
        .unwrap_or("an error occurred");

    let mut response = Response::new(full_body(format!("{message}\n")));
    *response.status_mut() = status_code;
    response
}

pub async fn run_http_service<S>(host: &str, port: u16, service: S) -> Result<(), io::Error>
where
    S: Service<Request<Incoming>, Response = Response<ServiceBody>> + Send + Sync + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    S::Future: Send + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(%host, port, "listening");
    serve(listener, service).await
}

/// Accept loop over an already bound listener.
pub async fn serve<S>(listener: TcpListener, service: S) -> Result<(), io::Error>
where
    S: Service<Request<Incoming>, Response = Response<ServiceBody>> + Send + Sync + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    S::Future: Send + 'static,
{
    let service_arc = Arc::new(service);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket.
        // Dropping the connection drops any in-flight request future with it.
        tokio::spawn(async move {
            let svc = service_fn(move |mut req: Request<Incoming>| {
                req.extensions_mut().insert(ConnectInfo(peer_addr));
                svc.call(req)
            });
            if let Err(err) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(%peer_addr, error = %err, "connection closed with error");
            }
        });
    }
}
