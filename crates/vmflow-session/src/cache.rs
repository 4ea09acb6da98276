//! Process-wide session cache
//!
//! Sessions are keyed by `sha256(server, datacenter, credential fingerprint)`.
//! Reads of a live cached session only touch the concurrent map; creating a
//! session takes one global lock so that a cold start never logs in twice for
//! the same key.

use crate::error::{Result, SessionError};
use crate::params::{Credential, Params, cache_key, parse_server_url};
use crate::session::Session;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use vmflow_cloud::{
    Endpoint, ManagementApi, ManagementConnector, ObjectKind, TaggingApi, TaggingConnector,
};

struct Inner {
    sessions: DashMap<String, Arc<Session>>,
    create_lock: Mutex<()>,
    next_id: AtomicU64,
    management: Arc<dyn ManagementConnector>,
    tagging: Arc<dyn TaggingConnector>,
    user_agent: String,
}

impl Inner {
    /// Remove `key` only while it still maps to the session with `id`
    fn evict(&self, key: &str, id: u64) -> bool {
        self.sessions.remove_if(key, |_, s| s.id == id).is_some()
    }
}

/// Injectable session cache; clones share the same entries
#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<Inner>,
}

impl SessionCache {
    pub fn new(
        management: Arc<dyn ManagementConnector>,
        tagging: Arc<dyn TaggingConnector>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: DashMap::new(),
                create_lock: Mutex::new(()),
                next_id: AtomicU64::new(1),
                management,
                tagging,
                user_agent: format!("vmflow/{}", env!("CARGO_PKG_VERSION")),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Return a live cached session for `params` or log in a new one
    pub async fn get_or_create(&self, params: &Params) -> Result<Arc<Session>> {
        let credential = params.credential()?;
        let url = parse_server_url(&params.server)?;
        let key = cache_key(&params.server, &params.datacenter, &credential);

        if let Some(session) = self.cached(&key) {
            if session.is_active().await {
                debug!(server = %params.server, datacenter = %params.datacenter, "found active cached session");
                return Ok(session);
            }
        }

        let _guard = self.inner.create_lock.lock().await;

        // Another caller may have replaced the entry while we waited.
        if let Some(session) = self.cached(&key) {
            if session.is_active().await {
                return Ok(session);
            }
            info!(server = %params.server, datacenter = %params.datacenter, "cached session is no longer active, logging out");
            session.logout().await;
            self.inner.evict(&key, session.id);
        }

        let session = Arc::new(self.create(params, &credential, url, key.clone()).await?);
        self.inner.sessions.insert(key, session.clone());
        Ok(session)
    }

    fn cached(&self, key: &str) -> Option<Arc<Session>> {
        self.inner.sessions.get(key).map(|s| s.value().clone())
    }

    async fn create(
        &self,
        params: &Params,
        credential: &Credential,
        url: url::Url,
        key: String,
    ) -> Result<Session> {
        let endpoint = Endpoint {
            url: url.clone(),
            thumbprint: params.thumbprint.clone(),
            user_agent: self.inner.user_agent.clone(),
        };
        let login_failed = |source| SessionError::Login {
            server: params.server.clone(),
            source,
        };

        let management = self
            .inner
            .management
            .connect(&endpoint)
            .await
            .map_err(login_failed)?;
        let tagging = self
            .inner
            .tagging
            .connect(&endpoint)
            .await
            .map_err(login_failed)?;

        let tagging_login = match credential {
            Credential::Password { username, password } => {
                management
                    .login(username, password)
                    .await
                    .map_err(login_failed)?;
                tagging.login(username, password).await
            }
            Credential::Certificate(certificate) => {
                let token = management
                    .issue_token(certificate)
                    .await
                    .map_err(login_failed)?;
                management
                    .login_by_token(&token)
                    .await
                    .map_err(login_failed)?;
                tagging.login_by_token(&token).await
            }
        };
        if let Err(source) = tagging_login {
            // The management login already succeeded on the endpoint.
            if let Err(e) = management.logout().await {
                warn!(server = %params.server, error = %e, "logout after failed REST login failed");
            }
            return Err(login_failed(source));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let mut session = Session {
            id,
            key: key.clone(),
            url,
            datacenter: None,
            management: management.clone(),
            tagging: tagging.clone(),
            keepalive: Vec::new(),
        };

        if !params.datacenter.is_empty() {
            match management
                .find_by_name(None, ObjectKind::Datacenter, &params.datacenter)
                .await
            {
                Ok(dc) => session.datacenter = Some(dc),
                Err(source) => {
                    session.logout().await;
                    return Err(SessionError::Datacenter {
                        name: params.datacenter.clone(),
                        source,
                    });
                }
            }
        }

        if params.feature.enable_keep_alive {
            let interval = params.feature.keep_alive_interval();
            let weak = Arc::downgrade(&self.inner);
            session.keepalive = vec![
                spawn_management_keepalive(weak.clone(), key.clone(), id, interval, management),
                spawn_tagging_keepalive(weak, key, id, interval, tagging),
            ];
        }

        info!(
            server = %params.server,
            datacenter = %params.datacenter,
            keepalive = params.feature.enable_keep_alive,
            "new session created and cached"
        );
        Ok(session)
    }

    /// Log out and drop every cached session
    pub async fn clear(&self) {
        let keys: Vec<String> = self
            .inner
            .sessions
            .iter()
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            if let Some((_, session)) = self.inner.sessions.remove(&key) {
                session.logout().await;
            }
        }
    }
}

fn spawn_management_keepalive(
    cache: Weak<Inner>,
    key: String,
    id: u64,
    interval: Duration,
    client: Arc<dyn ManagementApi>,
) -> AbortHandle {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = client.current_time().await {
                error!(key = %key, error = %e, "management keepalive failed, evicting session");
                evict(&cache, &key, id);
                return;
            }
        }
    })
    .abort_handle()
}

fn spawn_tagging_keepalive(
    cache: Weak<Inner>,
    key: String,
    id: u64,
    interval: Duration,
    client: Arc<dyn TaggingApi>,
) -> AbortHandle {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match client.session().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    error!(key = %key, "REST keepalive found no session, evicting session");
                    evict(&cache, &key, id);
                    return;
                }
                Err(e) => {
                    error!(key = %key, error = %e, "REST keepalive failed, evicting session");
                    evict(&cache, &key, id);
                    return;
                }
            }
        }
    })
    .abort_handle()
}

fn evict(cache: &Weak<Inner>, key: &str, id: u64) {
    if let Some(inner) = cache.upgrade() {
        if inner.evict(key, id) {
            debug!(key = %key, "session evicted from cache");
        }
    }
}
