//! Connector setup for the hyper HTTP/2 client.
//!
//! # Feature Flags
//!
//! - **Crypto providers** (choose one):
//!   - `tls-ring` - Use ring crypto (default with `tls` feature)
//!   - `tls-aws-lc` - Use AWS LC crypto
//!
//! - **Default root certificates** (choose one):
//!   - `tls-webpki-roots` - Bundled Mozilla root certificates (default with `tls` feature)
//!   - `tls-native-roots` - System root certificates
//!
//! Without a provider feature the process-wide default installed through
//! `CryptoProvider::install_default()` is used.

use std::sync::Arc;
use std::time::Duration;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;
use rustls::crypto::CryptoProvider;

/// Check if TLS works out of the box.
///
/// True when a crypto provider is compiled in and a default root store is
/// available.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(
            feature = "tls-native-roots",
            feature = "tls-webpki-roots"
        ))
}

/// Get the crypto provider to build TLS configs with.
///
/// Priority:
/// 1. Feature-gated provider (tls-ring, then tls-aws-lc)
/// 2. User-installed global default provider
pub(crate) fn crypto_provider() -> Result<Arc<CryptoProvider>, String> {
    #[cfg(feature = "tls-ring")]
    return Ok(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    return Ok(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    {
        CryptoProvider::get_default().cloned().ok_or_else(|| {
            "no crypto provider: enable `tls-ring` or `tls-aws-lc`, or install one with \
             `CryptoProvider::install_default()`"
                .to_string()
        })
    }
}

/// Start a client config with the given provider and safe protocol versions.
pub(crate) fn config_builder(
    provider: Arc<CryptoProvider>,
) -> Result<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>, String> {
    ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| e.to_string())
}

/// Build the root store used when a call supplies no root certificates.
///
/// Native roots win when both root features are enabled.
pub(crate) fn default_root_store() -> Result<rustls::RootCertStore, String> {
    #[allow(unused_mut)]
    let mut roots = rustls::RootCertStore::empty();

    #[cfg(feature = "tls-native-roots")]
    {
        let native_certs = rustls_native_certs::load_native_certs();
        if !native_certs.errors.is_empty() {
            // Some certs may still have loaded
            tracing::debug!("errors loading native certs: {:?}", native_certs.errors);
        }
        roots.add_parsable_certificates(native_certs.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    if roots.is_empty() {
        return Err(
            "no default root certificates: enable `tls-webpki-roots` or `tls-native-roots`, \
             or pass root certificates explicitly"
                .to_string(),
        );
    }

    Ok(roots)
}

/// Build a plain TCP connector.
pub(crate) fn build_http_connector(
    connect_timeout: Option<Duration>,
    nodelay: bool,
) -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    connector.set_connect_timeout(connect_timeout);
    connector.set_nodelay(nodelay);
    connector
}

/// Wrap a TCP connector with TLS, negotiating HTTP/2 through ALPN.
pub(crate) fn build_https_connector(
    tls_config: &ClientConfig,
    http: HttpConnector,
) -> HttpsConnector<HttpConnector> {
    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config.clone())
        .https_only()
        .enable_http2()
        .wrap_connector(http)
}
