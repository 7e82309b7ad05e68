//! XRPC client over HTTP

use super::types::{
    CreateSessionRequest, ListRecordsPage, RepoDescription, ResolveHandleResponse, SessionTokens,
    XrpcErrorBody,
};
use super::RepositoryApi;
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::model::RawRecord;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::RwLock;

/// XRPC error codes that mean the session is missing or expired
const SESSION_ERRORS: &[&str] = &[
    "AuthRequired",
    "AuthenticationRequired",
    "ExpiredToken",
    "InvalidToken",
];

/// Repository client speaking XRPC to a personal data server.
///
/// When `password_env` is configured a session is created lazily on the
/// first request and its access token attached to every call after that.
pub struct XrpcClient {
    service: reqwest::Url,
    identifier: String,
    password_env: Option<String>,
    client: reqwest::Client,
    session: Arc<RwLock<Option<SessionTokens>>>,
}

impl XrpcClient {
    /// Create a client for the configured service
    pub fn new(config: &RepositoryConfig) -> Result<Self> {
        let service = reqwest::Url::parse(&config.service).map_err(|e| {
            Error::Config(format!("Invalid service URL {}: {}", config.service, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("atsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            service,
            identifier: config.identifier.clone(),
            password_env: config.password_env.clone(),
            client,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Base URL of the service
    pub fn service(&self) -> &reqwest::Url {
        &self.service
    }

    /// DID of the authenticated account, once a session exists
    pub async fn session_did(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.did.clone())
    }

    /// Drop the current session; the next request creates a new one
    pub async fn reset_session(&self) {
        *self.session.write().await = None;
    }

    fn endpoint(&self, nsid: &str) -> Result<reqwest::Url> {
        self.service
            .join(&format!("xrpc/{}", nsid))
            .map_err(|e| Error::Config(format!("Invalid XRPC endpoint {}: {}", nsid, e)))
    }

    /// Access token for the current session, creating one if configured
    async fn access_token(&self) -> Result<Option<String>> {
        let Some(env_name) = self.password_env.as_deref() else {
            return Ok(None);
        };

        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(Some(session.access_jwt.clone()));
        }

        let password = std::env::var(env_name).map_err(|_| {
            Error::Session(format!(
                "App password env var {} is not set",
                env_name
            ))
        })?;

        let url = self.endpoint("com.atproto.server.createSession")?;
        let response = self
            .client
            .post(url)
            .json(&CreateSessionRequest {
                identifier: &self.identifier,
                password: &password,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: XrpcErrorBody = response.json().await.unwrap_or_default();
            return Err(Error::Session(format!(
                "createSession failed ({}): {} {}",
                status.as_u16(),
                body.error,
                body.message
            )));
        }

        let tokens: SessionTokens = response.json().await?;
        tracing::info!("Created session for {} ({})", tokens.handle, tokens.did);
        let token = tokens.access_jwt.clone();
        *self.session.write().await = Some(tokens);
        Ok(Some(token))
    }

    /// Issue an XRPC query and decode the JSON response
    async fn query<T: DeserializeOwned>(&self, nsid: &str, params: &[(&str, String)]) -> Result<T> {
        let url = self.endpoint(nsid)?;
        let mut request = self.client.get(url).query(params);
        if let Some(token) = self.access_token().await? {
            request = request.bearer_auth(token);
        }

        tracing::debug!("XRPC {} {:?}", nsid, params);
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body: XrpcErrorBody = response.json().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || SESSION_ERRORS.contains(&body.error.as_str())
        {
            self.reset_session().await;
            return Err(Error::Session(format!(
                "{} rejected the session: {} {}",
                nsid, body.error, body.message
            )));
        }

        Err(Error::Xrpc {
            status: status.as_u16(),
            error: body.error,
            message: body.message,
        })
    }
}

#[async_trait]
impl RepositoryApi for XrpcClient {
    async fn resolve_handle(&self, handle: &str) -> Result<String> {
        let response: ResolveHandleResponse = self
            .query(
                "com.atproto.identity.resolveHandle",
                &[("handle", handle.to_string())],
            )
            .await?;
        Ok(response.did)
    }

    async fn list_records(
        &self,
        repo: &str,
        collection: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<ListRecordsPage> {
        let mut params = vec![
            ("repo", repo.to_string()),
            ("collection", collection.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        self.query("com.atproto.repo.listRecords", &params).await
    }

    async fn get_record(&self, repo: &str, collection: &str, rkey: &str) -> Result<RawRecord> {
        self.query(
            "com.atproto.repo.getRecord",
            &[
                ("repo", repo.to_string()),
                ("collection", collection.to_string()),
                ("rkey", rkey.to_string()),
            ],
        )
        .await
    }

    async fn describe_repo(&self, repo: &str) -> Result<RepoDescription> {
        self.query("com.atproto.repo.describeRepo", &[("repo", repo.to_string())])
            .await
    }
}
