//! Line-oriented query server.
//!
//! Each connection sends newline-delimited paths in the query grammar
//! (`cpu`, `fs/mnt_point//`, `mem/percent/history/3`, ...) and receives one
//! JSON line per path:
//!
//! ```text
//! {"status":200,"body":{...}}
//! {"status":404,"error":"not found: plugin nope"}
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use hostwatch_core::{QueryError, QueryResolver, Route, StatsRegistry};
use serde_json::{json, Value as JsonValue};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Status code reported for a query error.
pub fn status_code(err: &QueryError) -> u16 {
    match err {
        QueryError::NotFound(_) => 404,
        QueryError::Unavailable(_) => 503,
        QueryError::Encode(_) => 500,
    }
}

/// Resolve one path into its response document.
///
/// Responses built from a plugin's snapshot carry `"stale": true` when the
/// latest collection for that plugin failed.
pub fn respond(registry: &StatsRegistry, path: &str) -> JsonValue {
    let resolver = QueryResolver::new(registry);
    let route = match Route::parse(path) {
        Ok(route) => route,
        Err(e) => return error_response(&e),
    };
    if route == Route::Status {
        return json!({ "status": 200 });
    }

    match resolver.route(&route) {
        Ok(body) => {
            let mut response = json!({ "status": 200, "body": body });
            if let Route::Plugin(plugin) | Route::Field { plugin, .. } | Route::Value { plugin, .. } =
                &route
            {
                if resolver.is_stale(plugin) {
                    response["stale"] = JsonValue::Bool(true);
                }
            }
            response
        }
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &QueryError) -> JsonValue {
    json!({ "status": status_code(err), "error": err.to_string() })
}

/// TCP server answering queries against a shared registry.
pub struct QueryServer {
    listener: TcpListener,
    registry: Arc<StatsRegistry>,
}

impl QueryServer {
    /// Bind to `addr` (host:port).
    pub async fn bind(addr: &str, registry: Arc<StatsRegistry>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` flips to true.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        match self.listener.local_addr() {
            Ok(addr) => info!("Query server listening on {}", addr),
            Err(e) => warn!("Query server address unavailable: {}", e),
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Query connection from {}", peer);
                        let registry = self.registry.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &registry, shutdown).await {
                                debug!("Query connection {} ended: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => warn!("Failed to accept query connection: {}", e),
                },
            }
        }

        info!("Query server stopped");
    }
}

/// Answer newline-delimited paths read from `stream` until EOF or shutdown.
pub async fn handle_connection<S>(
    stream: S,
    registry: &StatsRegistry,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = shutdown.changed() => return Ok(()),
            read = reader.read_line(&mut line) => read?,
        };
        if read == 0 {
            return Ok(());
        }

        let path = line.trim();
        if path.is_empty() {
            continue;
        }

        let mut response = respond(registry, path).to_string();
        response.push('\n');
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
    }
}
