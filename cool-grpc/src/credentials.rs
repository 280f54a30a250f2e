//! Transport credentials built from per-call TLS material.
//!
//! A call without TLS configuration, or with a configuration where nothing is
//! set, runs over plaintext HTTP/2. Anything else produces a ready
//! [`rustls::ClientConfig`].

use std::sync::Arc;

use bytes::Bytes;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::DispatchError;
use crate::transport::connector::{config_builder, crypto_provider, default_root_store};

/// Callback deciding whether a server certificate is acceptable for a host.
///
/// Receives the host name the client connected to and the server's leaf
/// certificate. An `Err` aborts the handshake with the given reason.
pub type CheckServerIdentity =
    Arc<dyn Fn(&str, &CertificateDer<'_>) -> Result<(), String> + Send + Sync>;

/// PEM-encoded TLS material, given either as raw bytes or as text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TlsMaterial {
    Bytes(Bytes),
    Text(String),
}

impl TlsMaterial {
    /// Normalize to raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TlsMaterial::Bytes(bytes) => bytes,
            TlsMaterial::Text(text) => text.as_bytes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<Bytes> for TlsMaterial {
    fn from(value: Bytes) -> Self {
        TlsMaterial::Bytes(value)
    }
}

impl From<Vec<u8>> for TlsMaterial {
    fn from(value: Vec<u8>) -> Self {
        TlsMaterial::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for TlsMaterial {
    fn from(value: &'static [u8]) -> Self {
        TlsMaterial::Bytes(Bytes::from_static(value))
    }
}

impl From<String> for TlsMaterial {
    fn from(value: String) -> Self {
        TlsMaterial::Text(value)
    }
}

impl From<&str> for TlsMaterial {
    fn from(value: &str) -> Self {
        TlsMaterial::Text(value.to_string())
    }
}

/// Extra server verification settings.
#[derive(Clone, Default)]
pub struct VerifyOptions {
    check_server_identity: Option<CheckServerIdentity>,
}

impl VerifyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default host name check with a callback.
    ///
    /// The certificate chain is still validated against the root store; only
    /// the host name match is delegated.
    pub fn check_server_identity<F>(mut self, check: F) -> Self
    where
        F: Fn(&str, &CertificateDer<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.check_server_identity = Some(Arc::new(check));
        self
    }
}

impl std::fmt::Debug for VerifyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyOptions")
            .field("check_server_identity", &self.check_server_identity.is_some())
            .finish()
    }
}

/// TLS settings for a single call.
///
/// # Example
///
/// ```
/// use cool_grpc::TlsConfig;
///
/// let tls = TlsConfig::new().root_certs("-----BEGIN CERTIFICATE-----\n...");
/// assert!(!tls.is_empty());
/// assert!(TlsConfig::new().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    root_certs: Option<TlsMaterial>,
    private_key: Option<TlsMaterial>,
    cert_chain: Option<TlsMaterial>,
    verify_options: Option<VerifyOptions>,
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// PEM root certificates to trust instead of the default store.
    pub fn root_certs(mut self, certs: impl Into<TlsMaterial>) -> Self {
        self.root_certs = Some(certs.into());
        self
    }

    /// PEM private key for client authentication.
    pub fn private_key(mut self, key: impl Into<TlsMaterial>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// PEM certificate chain for client authentication, leaf first.
    pub fn cert_chain(mut self, chain: impl Into<TlsMaterial>) -> Self {
        self.cert_chain = Some(chain.into());
        self
    }

    pub fn verify_options(mut self, options: VerifyOptions) -> Self {
        self.verify_options = Some(options);
        self
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.root_certs.is_none()
            && self.private_key.is_none()
            && self.cert_chain.is_none()
            && self.verify_options.is_none()
    }
}

/// Credentials handed to the transport.
#[derive(Clone, Debug)]
pub enum Credentials {
    /// Plaintext HTTP/2.
    Insecure,
    /// HTTP/2 over TLS.
    Secure(Arc<ClientConfig>),
}

impl Credentials {
    pub fn is_secure(&self) -> bool {
        matches!(self, Credentials::Secure(_))
    }

    /// Get the TLS configuration of secure credentials.
    pub fn tls_config(&self) -> Option<&Arc<ClientConfig>> {
        match self {
            Credentials::Insecure => None,
            Credentials::Secure(config) => Some(config),
        }
    }
}

/// Build transport credentials from optional TLS settings.
///
/// # Errors
///
/// Returns [`DispatchError::CredentialConstruction`] when a field is present
/// but empty or unparseable, when only one half of the client identity is
/// given, or when no crypto provider or default roots are available.
pub fn build_credentials(tls: Option<&TlsConfig>) -> Result<Credentials, DispatchError> {
    let Some(tls) = tls.filter(|tls| !tls.is_empty()) else {
        return Ok(Credentials::Insecure);
    };

    build_client_config(tls)
        .map(|config| Credentials::Secure(Arc::new(config)))
        .map_err(DispatchError::CredentialConstruction)
}

fn build_client_config(tls: &TlsConfig) -> Result<ClientConfig, String> {
    let provider = crypto_provider()?;

    let roots = match &tls.root_certs {
        Some(material) => {
            let mut store = RootCertStore::empty();
            for cert in parse_certificates("root certificates", material)? {
                store
                    .add(cert)
                    .map_err(|e| format!("invalid root certificate: {e}"))?;
            }
            store
        }
        None => default_root_store()?,
    };

    let identity = match (&tls.private_key, &tls.cert_chain) {
        (Some(key), Some(chain)) => Some((
            parse_certificates("certificate chain", chain)?,
            parse_private_key(key)?,
        )),
        (None, None) => None,
        (Some(_), None) => return Err("private key given without a certificate chain".into()),
        (None, Some(_)) => return Err("certificate chain given without a private key".into()),
    };

    let check = tls
        .verify_options
        .as_ref()
        .and_then(|options| options.check_server_identity.clone());

    let builder = config_builder(provider.clone())?;
    let builder = match check {
        Some(check) => {
            let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|e| format!("failed to build certificate verifier: {e}"))?;
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(IdentityCheckingVerifier {
                    inner,
                    check,
                }))
        }
        None => builder.with_root_certificates(roots),
    };

    match identity {
        Some((chain, key)) => builder
            .with_client_auth_cert(chain, key)
            .map_err(|e| format!("invalid client identity: {e}")),
        None => Ok(builder.with_no_client_auth()),
    }
}

fn non_empty<'a>(what: &str, material: &'a TlsMaterial) -> Result<&'a [u8], String> {
    if material.is_empty() {
        return Err(format!("{what} are empty"));
    }
    Ok(material.as_bytes())
}

fn parse_certificates(
    what: &str,
    material: &TlsMaterial,
) -> Result<Vec<CertificateDer<'static>>, String> {
    let certs = CertificateDer::pem_slice_iter(non_empty(what, material)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("failed to parse {what}: {e}"))?;
    if certs.is_empty() {
        return Err(format!("no PEM certificates found in {what}"));
    }
    Ok(certs)
}

fn parse_private_key(material: &TlsMaterial) -> Result<PrivateKeyDer<'static>, String> {
    if material.is_empty() {
        return Err("private key is empty".into());
    }
    PrivateKeyDer::from_pem_slice(material.as_bytes())
        .map_err(|e| format!("failed to parse private key: {e}"))
}

/// Chain validation from webpki, host name check from the caller.
struct IdentityCheckingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    check: CheckServerIdentity,
}

impl std::fmt::Debug for IdentityCheckingVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCheckingVerifier")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl ServerCertVerifier for IdentityCheckingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Ok(_) => {}
            // Name mismatches are the callback's call
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => {}
            Err(e) => return Err(e),
        }

        (self.check)(&server_name.to_str(), end_entity).map_err(|reason| {
            rustls::Error::General(format!("server identity check failed: {reason}"))
        })?;

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CA_PEM: &str = include_str!("../tests/fixtures/ca.pem");
    const CLIENT_PEM: &str = include_str!("../tests/fixtures/client.pem");
    const CLIENT_KEY: &str = include_str!("../tests/fixtures/client.key");

    fn construction_error(tls: TlsConfig) -> String {
        match build_credentials(Some(&tls)) {
            Err(DispatchError::CredentialConstruction(reason)) => reason,
            other => panic!("expected a construction error, got {other:?}"),
        }
    }

    #[test]
    fn test_absent_config_is_insecure() {
        let credentials = build_credentials(None).unwrap();
        assert!(matches!(credentials, Credentials::Insecure));
    }

    #[test]
    fn test_empty_config_is_insecure() {
        let credentials = build_credentials(Some(&TlsConfig::new())).unwrap();
        assert!(!credentials.is_secure());
        assert!(credentials.tls_config().is_none());
    }

    #[test]
    fn test_tls_material_normalization() {
        let text = TlsMaterial::from("pem");
        let bytes = TlsMaterial::from(b"pem".to_vec());
        assert_eq!(text.as_bytes(), bytes.as_bytes());
        assert!(TlsMaterial::from("").is_empty());
    }

    #[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
    #[test]
    fn test_custom_roots_are_secure() {
        let credentials = build_credentials(Some(&TlsConfig::new().root_certs(CA_PEM))).unwrap();
        assert!(credentials.is_secure());

        let credentials =
            build_credentials(Some(&TlsConfig::new().root_certs(CA_PEM.as_bytes().to_vec())))
                .unwrap();
        assert!(credentials.is_secure());
    }

    #[cfg(all(
        any(feature = "tls-ring", feature = "tls-aws-lc"),
        any(feature = "tls-webpki-roots", feature = "tls-native-roots")
    ))]
    #[test]
    fn test_verify_options_alone_are_secure() {
        let options = VerifyOptions::new().check_server_identity(|_, _| Ok(()));
        let credentials =
            build_credentials(Some(&TlsConfig::new().verify_options(options))).unwrap();
        assert!(credentials.is_secure());
    }

    #[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
    #[test]
    fn test_client_identity() {
        let tls = TlsConfig::new()
            .root_certs(CA_PEM)
            .private_key(CLIENT_KEY)
            .cert_chain(CLIENT_PEM);
        let credentials = build_credentials(Some(&tls)).unwrap();
        assert!(credentials.tls_config().unwrap().client_auth_cert_resolver.has_certs());
    }

    #[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
    #[test]
    fn test_half_identity_is_rejected() {
        let reason = construction_error(TlsConfig::new().root_certs(CA_PEM).private_key(CLIENT_KEY));
        assert!(reason.contains("without a certificate chain"), "{reason}");

        let reason = construction_error(TlsConfig::new().root_certs(CA_PEM).cert_chain(CLIENT_PEM));
        assert!(reason.contains("without a private key"), "{reason}");
    }

    #[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
    #[test]
    fn test_empty_field_is_rejected() {
        let reason = construction_error(TlsConfig::new().root_certs(""));
        assert!(reason.contains("empty"), "{reason}");

        let reason = construction_error(
            TlsConfig::new()
                .root_certs(CA_PEM)
                .private_key(Vec::new())
                .cert_chain(CLIENT_PEM),
        );
        assert!(reason.contains("empty"), "{reason}");
    }

    #[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
    #[test]
    fn test_garbage_pem_is_rejected() {
        let reason = construction_error(TlsConfig::new().root_certs("not a certificate"));
        assert!(reason.contains("root certificates"), "{reason}");

        let reason = construction_error(
            TlsConfig::new()
                .root_certs(CA_PEM)
                .private_key("not a key")
                .cert_chain(CLIENT_PEM),
        );
        assert!(reason.contains("private key"), "{reason}");
    }
}
