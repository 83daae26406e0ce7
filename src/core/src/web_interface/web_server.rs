use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};

use super::routes::api_routes;
use crate::error_handling::types::WebError;
use crate::session_management::Aggregator;

/// HTTP front of the aggregator.
pub struct WebServer {
    aggregator: Arc<Aggregator>,
    max_body_bytes: u64,
}

impl WebServer {
    pub fn new(aggregator: Arc<Aggregator>, max_body_bytes: u64) -> Self {
        Self {
            aggregator,
            max_body_bytes,
        }
    }

    /// Serves on `addr` until `shutdown` resolves.
    pub async fn start<F>(&self, addr: SocketAddr, shutdown: F) -> Result<(), WebError>
    where
        F: Future<Output = ()> + Send,
    {
        // surface a taken port as an error instead of a panic inside warp
        match tokio::net::TcpListener::bind(addr).await {
            Ok(probe) => drop(probe),
            Err(e) => {
                error!("Cannot bind {}: {}", addr, e);
                return Err(WebError::BindFailed(format!("{}: {}", addr, e)));
            }
        }

        let routes = api_routes(self.aggregator.clone(), self.max_body_bytes);
        info!("Web server listening on http://{}", addr);
        tokio::select! {
            _ = warp::serve(routes).run(addr) => {},
            _ = shutdown => info!("Web server shutting down"),
        }
        Ok(())
    }
}
