//! Named TLS profiles for upstream connections.
//!
//! # Responsibilities
//! - Hold the profiles declared under `tls`
//! - Resolve a profile name into a [`TlsClientPolicy`]
//! - Compile a policy into a reqwest client builder
//!
//! # Design Decisions
//! - Name lookup happens before any file is touched
//! - Insecure profiles never read their paths (sentinels like `/dev/null` are fine)
//! - Verified profiles use the configured CA bundle as the only trust roots

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use rustls::pki_types::CertificateDer;

use crate::config::{ConfigError, TlsProfileConfig};

/// A TLS profile as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsProfile {
    pub name: String,
    pub insecure: bool,
    pub cert_path: PathBuf,
    pub key_path: Option<PathBuf>,
    pub client_ca_cert_path: Option<PathBuf>,
}

/// Concrete transport policy for one upstream client.
#[derive(Clone)]
pub enum TlsClientPolicy {
    /// Certificate verification disabled entirely.
    Insecure,
    /// Client identity plus a private set of trust roots.
    Verified {
        /// Certificate chain followed by the private key, PEM encoded.
        identity_pem: Vec<u8>,
        ca_certs: Vec<CertificateDer<'static>>,
    },
}

impl fmt::Debug for TlsClientPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsClientPolicy::Insecure => write!(f, "Insecure"),
            TlsClientPolicy::Verified { ca_certs, .. } => f
                .debug_struct("Verified")
                .field("ca_certs", &ca_certs.len())
                .finish_non_exhaustive(),
        }
    }
}

impl TlsClientPolicy {
    pub fn is_insecure(&self) -> bool {
        matches!(self, TlsClientPolicy::Insecure)
    }

    /// Apply this policy to a client builder.
    pub fn configure(
        &self,
        builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, reqwest::Error> {
        let builder = builder.use_rustls_tls();
        match self {
            TlsClientPolicy::Insecure => Ok(builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)),
            TlsClientPolicy::Verified {
                identity_pem,
                ca_certs,
            } => {
                let mut builder = builder
                    .tls_built_in_root_certs(false)
                    .identity(reqwest::Identity::from_pem(identity_pem)?);
                for der in ca_certs {
                    builder = builder.add_root_certificate(reqwest::Certificate::from_der(der)?);
                }
                Ok(builder)
            }
        }
    }
}

/// Read-only store of TLS profiles, shared by every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsProfileStore {
    profiles: BTreeMap<String, TlsProfile>,
}

impl TlsProfileStore {
    pub fn from_config(tls: &BTreeMap<String, TlsProfileConfig>) -> Self {
        let profiles = tls
            .iter()
            .map(|(name, cfg)| {
                (
                    name.clone(),
                    TlsProfile {
                        name: name.clone(),
                        insecure: cfg.insecure,
                        cert_path: cfg.cert_path.clone(),
                        key_path: cfg.key_path.clone(),
                        client_ca_cert_path: cfg.client_ca_cert_path.clone(),
                    },
                )
            })
            .collect();
        Self { profiles }
    }

    pub fn get(&self, name: &str) -> Option<&TlsProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Resolve a profile name into a client policy.
    pub fn resolve(&self, name: &str) -> Result<TlsClientPolicy, ConfigError> {
        let profile = self.get(name).ok_or_else(|| ConfigError::UnknownTlsProfile {
            name: name.to_string(),
        })?;

        if profile.insecure {
            tracing::warn!(profile = %name, "TLS profile skips certificate verification");
            return Ok(TlsClientPolicy::Insecure);
        }

        let key_path = profile
            .key_path
            .as_deref()
            .ok_or_else(|| missing(name, "key_path"))?;
        let ca_path = profile
            .client_ca_cert_path
            .as_deref()
            .ok_or_else(|| missing(name, "client_ca_cert_path"))?;

        let cert_pem = read_file(name, "cert_path", &profile.cert_path)?;
        let key_pem = read_file(name, "key_path", key_path)?;
        let ca_pem = read_file(name, "client_ca_cert_path", ca_path)?;

        parse_certs(&cert_pem).ok_or_else(|| ConfigError::InvalidPem {
            profile: name.to_string(),
            field: "cert_path",
            path: profile.cert_path.clone(),
            expected: "certificate",
        })?;
        let has_key = matches!(rustls_pemfile::private_key(&mut key_pem.as_slice()), Ok(Some(_)));
        if !has_key {
            return Err(ConfigError::InvalidPem {
                profile: name.to_string(),
                field: "key_path",
                path: key_path.to_path_buf(),
                expected: "private key",
            });
        }
        let ca_certs = parse_certs(&ca_pem).ok_or_else(|| ConfigError::InvalidPem {
            profile: name.to_string(),
            field: "client_ca_cert_path",
            path: ca_path.to_path_buf(),
            expected: "certificate",
        })?;

        let mut identity_pem = cert_pem;
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(&key_pem);

        Ok(TlsClientPolicy::Verified {
            identity_pem,
            ca_certs,
        })
    }
}

fn missing(profile: &str, field: &'static str) -> ConfigError {
    ConfigError::MissingTlsField {
        profile: profile.to_string(),
        field,
    }
}

fn read_file(profile: &str, field: &'static str, path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::UnreadableTlsFile {
        profile: profile.to_string(),
        field,
        path: path.to_path_buf(),
        source,
    })
}

/// All certificates in a PEM buffer, or `None` if there are none.
fn parse_certs(pem: &[u8]) -> Option<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    (!certs.is_empty()).then_some(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Pem {
        _dir: tempfile::TempDir,
        cert: PathBuf,
        key: PathBuf,
    }

    fn write_pem() -> Pem {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("tls.crt");
        let key = dir.path().join("tls.key");
        std::fs::write(&cert, generated.cert.pem()).unwrap();
        std::fs::write(&key, generated.key_pair.serialize_pem()).unwrap();
        Pem { _dir: dir, cert, key }
    }

    fn store(name: &str, profile: TlsProfileConfig) -> TlsProfileStore {
        let mut map = BTreeMap::new();
        map.insert(name.to_string(), profile);
        TlsProfileStore::from_config(&map)
    }

    fn verified(cert: PathBuf, key: Option<PathBuf>, ca: Option<PathBuf>) -> TlsProfileConfig {
        TlsProfileConfig {
            insecure: false,
            cert_path: cert,
            key_path: key,
            client_ca_cert_path: ca,
        }
    }

    #[test]
    fn unknown_profile_is_config_error() {
        let store = TlsProfileStore::default();
        let err = store.resolve("external_llm").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTlsProfile { ref name } if name == "external_llm"));
        assert!(err.to_string().contains("external_llm"));
    }

    #[test]
    fn insecure_profile_never_reads_paths() {
        for path in ["/dev/null", "/definitely/not/here.pem", ""] {
            let store = store(
                "external_llm",
                TlsProfileConfig {
                    insecure: true,
                    cert_path: PathBuf::from(path),
                    key_path: Some(PathBuf::from("/missing.key")),
                    client_ca_cert_path: None,
                },
            );
            assert!(store.resolve("external_llm").unwrap().is_insecure());
        }
    }

    #[test]
    fn verified_profile_with_readable_files_resolves() {
        let pem = write_pem();
        let store = store(
            "detectors",
            verified(pem.cert.clone(), Some(pem.key.clone()), Some(pem.cert.clone())),
        );
        let policy = store.resolve("detectors").unwrap();
        match &policy {
            TlsClientPolicy::Verified { ca_certs, identity_pem } => {
                assert_eq!(ca_certs.len(), 1);
                assert!(!identity_pem.is_empty());
            }
            TlsClientPolicy::Insecure => panic!("expected verified policy"),
        }
        assert!(policy.configure(reqwest::Client::builder()).unwrap().build().is_ok());
    }

    #[test]
    fn verified_profile_requires_every_file() {
        let pem = write_pem();
        let missing = PathBuf::from("/no/such/file.pem");

        let cases = [
            (verified(missing.clone(), Some(pem.key.clone()), Some(pem.cert.clone())), "cert_path"),
            (verified(pem.cert.clone(), Some(missing.clone()), Some(pem.cert.clone())), "key_path"),
            (verified(pem.cert.clone(), Some(pem.key.clone()), Some(missing.clone())), "client_ca_cert_path"),
        ];
        for (profile, expected_field) in cases {
            let err = store("p", profile).resolve("p").unwrap_err();
            match err {
                ConfigError::UnreadableTlsFile { field, .. } => assert_eq!(field, expected_field),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn verified_profile_requires_key_and_ca_fields() {
        let pem = write_pem();
        let err = store("p", verified(pem.cert.clone(), None, Some(pem.cert.clone())))
            .resolve("p")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingTlsField { field: "key_path", .. }));

        let err = store("p", verified(pem.cert.clone(), Some(pem.key.clone()), None))
            .resolve("p")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingTlsField { field: "client_ca_cert_path", .. }));
    }

    #[test]
    fn non_pem_file_is_rejected() {
        let pem = write_pem();
        let mut garbage = tempfile::NamedTempFile::new().unwrap();
        garbage.write_all(b"not a certificate").unwrap();

        let err = store(
            "p",
            verified(garbage.path().to_path_buf(), Some(pem.key.clone()), Some(pem.cert.clone())),
        )
        .resolve("p")
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPem { field: "cert_path", .. }));

        let err = store(
            "p",
            verified(pem.cert.clone(), Some(pem.cert.clone()), Some(pem.cert.clone())),
        )
        .resolve("p")
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPem { field: "key_path", .. }));
    }
}
