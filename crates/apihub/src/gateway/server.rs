use super::service::{handle_request, GatewayState};
use super::SharedConfig;
use crate::config::GatewaySettings;
use crate::proxy::create_http_client;
use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Upper bound on the periodic limiter sweep, however long the window is.
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(3600);

/// A bound listener that serves the shared config until told to stop.
///
/// The listener lives for the whole process; config reloads only swap the
/// rule set behind [`SharedConfig`].
pub struct GatewayServer {
    listener: TcpListener,
    state: Arc<GatewayState>,
}

impl GatewayServer {
    pub async fn bind(settings: GatewaySettings, config: SharedConfig) -> Result<Self> {
        let client = create_http_client().context("failed to create upstream HTTP client")?;
        let listener = TcpListener::bind(settings.listen)
            .await
            .with_context(|| format!("failed to bind {}", settings.listen))?;

        Ok(Self {
            listener,
            state: Arc::new(GatewayState::new(config, client, settings)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Accept connections until `shutdown` resolves, then give in-flight
    /// connections the configured grace period. Connections still open when
    /// it runs out are aborted.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self { listener, state } = self;
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();
        let sweeper = spawn_rate_limit_sweeper(&state);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let io = TokioIo::new(stream);
                            let state = Arc::clone(&state);
                            let service = service_fn(move |req| {
                                handle_request(req, Arc::clone(&state), peer)
                            });
                            let connection = graceful.watch(http1::Builder::new().serve_connection(io, service));
                            connections.spawn(async move {
                                if let Err(e) = connection.await {
                                    debug!(peer = %peer, error = %e, "connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept error");
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let grace = state.settings.shutdown_grace;
        tokio::select! {
            _ = graceful.shutdown() => {
                info!("all connections closed");
            }
            _ = tokio::time::sleep(grace) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    open = connections.len(),
                    "grace period elapsed, closing remaining connections"
                );
            }
        }
        connections.shutdown().await;
        Ok(())
    }
}

fn spawn_rate_limit_sweeper(state: &Arc<GatewayState>) -> Option<tokio::task::JoinHandle<()>> {
    let limiter = state.limiter.clone()?;
    let period = limiter.config().window.min(MAX_SWEEP_PERIOD);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            let now = ticker.tick().await;
            let removed = limiter.sweep(now.into_std());
            if removed > 0 {
                debug!(removed, remaining = limiter.len(), "periodic rate limit sweep");
            }
        }
    }))
}
