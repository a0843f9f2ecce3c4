//! TLS for the client-facing listener.

use axum_server::tls_rustls::RustlsConfig;

use crate::config::{ConfigError, ListenerTlsConfig};

/// Install the ring provider as the process default, once.
///
/// The server side builds rustls configs through the default provider.
pub fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        // Lost races leave another provider installed, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}

/// Load TLS configuration from certificate and key files.
pub async fn load_listener_tls(config: &ListenerTlsConfig) -> Result<RustlsConfig, ConfigError> {
    for path in [&config.cert_path, &config.key_path] {
        if !path.exists() {
            return Err(ConfigError::ListenerTls(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )));
        }
    }

    install_crypto_provider();
    RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(ConfigError::ListenerTls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn missing_listener_cert_is_config_error() {
        let config = ListenerTlsConfig {
            cert_path: PathBuf::from("/missing/tls.crt"),
            key_path: PathBuf::from("/missing/tls.key"),
        };
        let err = load_listener_tls(&config).await.unwrap_err();
        assert!(err.to_string().contains("/missing/tls.crt"));
    }

    #[tokio::test]
    async fn loads_generated_pair() {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = ListenerTlsConfig {
            cert_path: dir.path().join("tls.crt"),
            key_path: dir.path().join("tls.key"),
        };
        std::fs::write(&config.cert_path, generated.cert.pem()).unwrap();
        std::fs::write(&config.key_path, generated.key_pair.serialize_pem()).unwrap();

        assert!(load_listener_tls(&config).await.is_ok());
    }
}
