//! REST session client of the management endpoint
//!
//! Only the session resource is implemented: login with basic auth or a
//! signed token, session probe and logout. The session id returned at login
//! is sent back in the `vmware-api-session-id` header.

use crate::error::{Result, VsphereError};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;
use vmflow_cloud::{Endpoint, SignedToken, TaggingApi, TaggingConnector, UserSession};

const SESSION_PATH: &str = "/rest/com/vmware/cis/session";
pub const SESSION_HEADER: &str = "vmware-api-session-id";

/// Authorization header value for a token login
pub fn sign_header(token: &SignedToken) -> String {
    format!("SIGN token=\"{}\"", STANDARD.encode(token.assertion.as_bytes()))
}

/// REST endpoint URL for the session resource of `endpoint`
pub fn session_url(endpoint: &Url) -> Url {
    let mut url = endpoint.clone();
    url.set_path(SESSION_PATH);
    url.set_query(None);
    url.set_fragment(None);
    url
}

#[derive(Debug, Deserialize)]
struct Value<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    user: String,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    value: Option<ErrorValue>,
}

#[derive(Debug, Deserialize)]
struct ErrorValue {
    #[serde(default)]
    messages: Vec<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    default_message: String,
}

/// Best message out of an error response body
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.value)
        .and_then(|v| v.messages.into_iter().next())
        .map(|m| m.default_message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

fn user_session(id: &str, info: SessionInfo) -> UserSession {
    UserSession {
        key: id.to_string(),
        user_name: info.user,
        login_time: info.created_time.unwrap_or_else(Utc::now),
    }
}

/// Tagging client bound to one endpoint
pub struct RestClient {
    http: reqwest::Client,
    session_url: Url,
    session_id: RwLock<Option<String>>,
}

impl RestClient {
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(endpoint.user_agent.clone())
            .danger_accept_invalid_certs(endpoint.insecure())
            .build()?;
        Ok(Self {
            http,
            session_url: session_url(&endpoint.url),
            session_id: RwLock::new(None),
        })
    }

    async fn create_session(&self, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(VsphereError::Api {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }
        let id: Value<String> = serde_json::from_str(&body)?;
        *self.session_id.write().await = Some(id.value);
        tracing::debug!(url = %self.session_url, "REST session created");
        Ok(())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let request = self
            .http
            .post(self.session_url.clone())
            .basic_auth(username, Some(password));
        self.create_session(request).await
    }

    pub async fn login_by_token(&self, token: &SignedToken) -> Result<()> {
        let request = self
            .http
            .post(self.session_url.clone())
            .header(reqwest::header::AUTHORIZATION, sign_header(token));
        self.create_session(request).await
    }

    /// The current session; `None` when not logged in or expired
    pub async fn session(&self) -> Result<Option<UserSession>> {
        let Some(id) = self.session_id.read().await.clone() else {
            return Ok(None);
        };
        let mut url = self.session_url.clone();
        url.set_query(Some("~action=get"));
        let response = self.http.post(url).header(SESSION_HEADER, &id).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(VsphereError::Api {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }
        let info: Value<SessionInfo> = serde_json::from_str(&body)?;
        Ok(Some(user_session(&id, info.value)))
    }

    pub async fn logout(&self) -> Result<()> {
        let Some(id) = self.session_id.write().await.take() else {
            return Ok(());
        };
        let response = self
            .http
            .delete(self.session_url.clone())
            .header(SESSION_HEADER, &id)
            .send()
            .await?;
        let status = response.status();
        // An expired session is as good as logged out.
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        let body = response.text().await?;
        Err(VsphereError::Api {
            status: status.as_u16(),
            message: error_message(status, &body),
        })
    }

    fn host(&self) -> &str {
        self.session_url.host_str().unwrap_or_default()
    }
}

#[async_trait]
impl TaggingApi for RestClient {
    async fn login(&self, username: &str, password: &str) -> vmflow_cloud::Result<()> {
        RestClient::login(self, username, password)
            .await
            .map_err(|e| e.into_cloud("login", self.host()))
    }

    async fn login_by_token(&self, token: &SignedToken) -> vmflow_cloud::Result<()> {
        RestClient::login_by_token(self, token)
            .await
            .map_err(|e| e.into_cloud("login by token", self.host()))
    }

    async fn session(&self) -> vmflow_cloud::Result<Option<UserSession>> {
        RestClient::session(self)
            .await
            .map_err(|e| e.into_cloud("get session", self.host()))
    }

    async fn logout(&self) -> vmflow_cloud::Result<()> {
        RestClient::logout(self)
            .await
            .map_err(|e| e.into_cloud("logout", self.host()))
    }
}

/// Opens [`RestClient`]s
#[derive(Debug, Default, Clone)]
pub struct RestConnector;

#[async_trait]
impl TaggingConnector for RestConnector {
    async fn connect(&self, endpoint: &Endpoint) -> vmflow_cloud::Result<Arc<dyn TaggingApi>> {
        let client = RestClient::new(endpoint).map_err(|e| e.into_cloud("connect", endpoint.host()))?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str) -> Endpoint {
        Endpoint {
            url: Url::parse(url).unwrap(),
            thumbprint: None,
            user_agent: "vmflow/test".to_string(),
        }
    }

    #[test]
    fn test_session_url() {
        let url = session_url(&Url::parse("https://vc.local/sdk?x=1").unwrap());
        assert_eq!(url.as_str(), "https://vc.local/rest/com/vmware/cis/session");
        let url = session_url(&Url::parse("https://vc.local:8443").unwrap());
        assert_eq!(url.as_str(), "https://vc.local:8443/rest/com/vmware/cis/session");
    }

    #[test]
    fn test_sign_header() {
        let token = SignedToken {
            assertion: "<saml/>".to_string(),
            expires_at: None,
        };
        assert_eq!(sign_header(&token), "SIGN token=\"PHNhbWwvPg==\"");
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"type":"com.vmware.vapi.std.errors.unauthenticated","value":{"messages":[{"id":"x","default_message":"Authentication required."}]}}"#;
        assert_eq!(
            error_message(StatusCode::UNAUTHORIZED, body),
            "Authentication required."
        );
        assert_eq!(
            error_message(StatusCode::SERVICE_UNAVAILABLE, "<html/>"),
            "Service Unavailable"
        );
    }

    #[test]
    fn test_parse_session_info() {
        let body = r#"{"value":{"user":"VSPHERE.LOCAL\\Administrator","created_time":"2024-05-01T10:00:00Z","last_accessed_time":"2024-05-01T10:05:00Z"}}"#;
        let info: Value<SessionInfo> = serde_json::from_str(body).unwrap();
        let session = user_session("abc", info.value);
        assert_eq!(session.key, "abc");
        assert_eq!(session.user_name, "VSPHERE.LOCAL\\Administrator");
        assert_eq!(session.login_time.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_unauthenticated_maps_to_auth_failure() {
        let err = VsphereError::Api {
            status: 401,
            message: "Authentication required.".to_string(),
        };
        assert!(matches!(
            err.into_cloud("login", "vc.local"),
            vmflow_cloud::CloudError::AuthenticationFailed(_)
        ));
        let err = VsphereError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.into_cloud("login", "vc.local").to_string(), "login vc.local: 500: boom");
    }

    #[test]
    fn test_without_login_there_is_no_session() {
        let client = RestClient::new(&endpoint("https://vc.local/sdk")).unwrap();
        tokio_test::block_on(async {
            assert!(client.session().await.unwrap().is_none());
            client.logout().await.unwrap();
        });
    }
}
