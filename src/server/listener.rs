use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::GatewayError;

use super::dispatcher::Dispatcher;
use super::http_handler::HttpHandler;

/// HTTP/1.1 listener feeding the dispatcher. One task per connection.
pub struct HttpServer {
    bind: String,
    max_connections: usize,
    handler: Arc<HttpHandler>,
    active: Arc<AtomicUsize>,
}

impl HttpServer {
    pub fn new(
        bind: &str,
        max_connections: usize,
        max_body_size: usize,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            bind: bind.to_string(),
            max_connections,
            handler: Arc::new(HttpHandler::new(dispatcher, max_body_size)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn run<S>(&self, shutdown: S) -> Result<(), GatewayError>
    where
        S: Future<Output = ()>,
    {
        let listener = bind_tcp_listener(&self.bind)?;
        let listener = TcpListener::from_std(listener.into())?;
        info!(addr = %self.bind, "HTTP listener started");
        self.serve(listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` resolves.
    pub async fn serve<S>(&self, listener: TcpListener, shutdown: S) -> Result<(), GatewayError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!(active = self.active_connections(), "Listener shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(error = %err, "Failed to accept TCP connection");
                        continue;
                    }
                },
            };

            if self.max_connections > 0 && self.active_connections() >= self.max_connections {
                debug!(peer = %peer_addr, "Max connections reached, dropping");
                drop(stream);
                continue;
            }

            self.active.fetch_add(1, Ordering::Relaxed);
            let guard = ConnectionGuard {
                active: Arc::clone(&self.active),
            };
            let handler = Arc::clone(&self.handler);

            tokio::spawn(async move {
                let _guard = guard;
                serve_connection(stream, peer_addr, handler).await;
            });
        }
    }
}

fn bind_tcp_listener(addr: &str) -> Result<std::net::TcpListener, GatewayError> {
    let sock_addr: SocketAddr = addr
        .parse()
        .map_err(|_| GatewayError::BindAddress(addr.to_string()))?;

    let domain = if sock_addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let bind_err = |source| GatewayError::Bind {
        addr: addr.to_string(),
        source,
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&sock_addr.into()).map_err(bind_err)?;
    socket.listen(1024).map_err(bind_err)?;

    Ok(socket.into())
}

async fn serve_connection(stream: TcpStream, peer_addr: SocketAddr, handler: Arc<HttpHandler>) {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let h = Arc::clone(&handler);
        async move { Ok::<_, hyper::Error>(h.handle(req, peer_addr).await) }
    });

    let conn = http1::Builder::new()
        .keep_alive(true)
        .serve_connection(io, service);

    if let Err(err) = conn.await {
        debug!(peer = %peer_addr, error = %err, "HTTP connection error");
    }
}

struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_bind_address() {
        let err = bind_tcp_listener("not an address").unwrap_err();
        assert!(matches!(err, GatewayError::BindAddress(_)));
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = bind_tcp_listener("127.0.0.1:0").unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }
}
