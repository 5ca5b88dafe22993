//! Shared outbound HTTP client.

use crate::response::GatewayBody;
use hyper_rustls::ConfigBuilderExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 32;
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, GatewayBody>;

/// Create the pooled HTTP/1.1 client used for every proxied request. Both
/// `http` and `https` targets are supported.
pub fn create_http_client() -> Result<HttpClient, rustls::Error> {
    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(TCP_KEEPALIVE));
    http_connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
    http_connector.enforce_http(false);

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls_config()?)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .build(https_connector);

    debug!(
        max_idle_per_host = POOL_MAX_IDLE_PER_HOST,
        idle_timeout_secs = POOL_IDLE_TIMEOUT.as_secs(),
        "upstream connection pool configured"
    );
    Ok(client)
}

fn tls_config() -> Result<rustls::ClientConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = || {
        rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
    };

    let config = match builder()?.with_native_roots() {
        Ok(builder) => builder.with_no_client_auth(),
        Err(e) => {
            warn!(error = %e, "no native root certificates loaded; https upstreams will fail verification");
            builder()?
                .with_root_certificates(rustls::RootCertStore::empty())
                .with_no_client_auth()
        }
    };
    Ok(config)
}
