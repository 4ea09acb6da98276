//! Session parameters, credentials and server address handling

use crate::error::{Result, SessionError};
use sha2::{Digest, Sha256};
use std::net::Ipv6Addr;
use std::time::Duration;
use tracing::warn;
use url::Url;
use vmflow_cloud::ClientCertificate;

/// Keepalive interval used when keepalive is enabled without an explicit one
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Optional session features
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Feature {
    pub enable_keep_alive: bool,
    pub keep_alive_interval: Option<Duration>,
}

impl Feature {
    pub fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_KEEPALIVE_INTERVAL)
    }
}

/// Parameters of [`SessionCache::get_or_create`](crate::SessionCache::get_or_create)
#[derive(Clone, Default)]
pub struct Params {
    pub server: String,
    pub datacenter: String,
    pub username: String,
    pub password: String,
    /// PEM encoded client certificate
    pub certificate: Option<String>,
    /// PEM encoded private key of the client certificate
    pub private_key: Option<String>,
    pub thumbprint: Option<String>,
    pub feature: Feature,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = datacenter.into();
        self
    }

    pub fn with_user_info(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_certificate(
        mut self,
        certificate: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        self.certificate = Some(certificate.into());
        self.private_key = Some(private_key.into());
        self
    }

    pub fn with_thumbprint(mut self, thumbprint: impl Into<String>) -> Self {
        self.thumbprint = Some(thumbprint.into());
        self
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = feature;
        self
    }

    /// Pick the authentication method, failing without any network call when
    /// neither method is usable.
    pub fn credential(&self) -> Result<Credential> {
        let has_certificate = self.certificate.as_deref().is_some_and(|c| !c.is_empty());
        let has_key = self.private_key.as_deref().is_some_and(|k| !k.is_empty());

        if !self.username.is_empty() {
            if has_certificate || has_key {
                warn!(
                    server = %self.server,
                    "both username/password and client certificate supplied, using username/password"
                );
            }
            return Ok(Credential::Password {
                username: self.username.clone(),
                password: self.password.clone(),
            });
        }

        match (&self.certificate, &self.private_key) {
            (Some(cert), Some(key)) if has_certificate && has_key => {
                let certificate = ClientCertificate::from_pem(cert, key)
                    .map_err(|e| SessionError::InvalidCredentials(e.to_string()))?;
                Ok(Credential::Certificate(certificate))
            }
            _ if has_certificate => Err(SessionError::InvalidCredentials(
                "client certificate supplied without a private key".to_string(),
            )),
            _ if has_key => Err(SessionError::InvalidCredentials(
                "private key supplied without a client certificate".to_string(),
            )),
            _ => Err(SessionError::InvalidCredentials(
                "either username/password or a client certificate and key are required"
                    .to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Params")
            .field("server", &self.server)
            .field("datacenter", &self.datacenter)
            .field("username", &self.username)
            .field("thumbprint", &self.thumbprint)
            .field("feature", &self.feature)
            .finish_non_exhaustive()
    }
}

/// The authentication method of one session
#[derive(Clone)]
pub enum Credential {
    Password { username: String, password: String },
    Certificate(ClientCertificate),
}

impl Credential {
    /// Stable fingerprint that never contains secret material in clear text
    pub fn fingerprint(&self) -> String {
        match self {
            Credential::Password { username, password } => {
                format!("{}#{}", username, sha256_hex(password.as_bytes()))
            }
            Credential::Certificate(c) => format!(
                "{}#{}",
                sha256_hex(c.certificate_pem.as_bytes()),
                sha256_hex(c.private_key_pem.as_bytes())
            ),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Credential::Certificate(_) => f.write_str("Certificate"),
        }
    }
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Cache key of a (server, datacenter, credential) triple
pub fn cache_key(server: &str, datacenter: &str, credential: &Credential) -> String {
    sha256_hex(format!("{}#{}#{}", server, datacenter, credential.fingerprint()).as_bytes())
}

/// Turn a server address into the management endpoint URL
///
/// Bare IPv6 literals are bracketed, a missing scheme defaults to https and
/// a missing path to `/sdk`. User info is stripped.
pub fn parse_server_url(server: &str) -> Result<Url> {
    let invalid = |reason: String| SessionError::InvalidServer {
        server: server.to_string(),
        reason,
    };

    let trimmed = server.trim();
    if trimmed.is_empty() {
        return Err(invalid("server address is empty".to_string()));
    }

    let host = if trimmed.parse::<Ipv6Addr>().is_ok() {
        format!("[{}]", trimmed)
    } else {
        trimmed.to_string()
    };
    let with_scheme = if host.contains("://") {
        host
    } else {
        format!("https://{}", host)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/sdk");
    }
    // Credentials never travel in the URL.
    let _ = url.set_username("");
    let _ = url.set_password(None);
    Ok(url)
}
