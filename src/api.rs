//! Remote follower/following API boundary.
//!
//! The engine only needs "send an authenticated request, get back a status and
//! body". HTTP-level rejections (4xx/5xx) come back as a normal [`ApiResponse`];
//! only transport-level problems surface as [`ApiError`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::model::Credential;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid request path {path:?}: {reason}")]
    BadPath { path: String, reason: String },
}

/// Status and body of one completed round trip.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One independently made and torn down request lifecycle. Implementations
/// must tolerate interleaved calls from concurrent tasks. An `Err` means the
/// transport failed; HTTP-level rejections are `Ok` with a non-2xx status.
#[async_trait]
pub trait SocialApi: Send + Sync {
    async fn send(
        &self,
        method: Method,
        path: &str,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse>;
}

#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn new(base_url: Url, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        credential: Option<&Credential>,
    ) -> Result<reqwest::Request, ApiError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::BadPath {
                path: path.to_string(),
                reason: err.to_string(),
            })?;
        let mut builder = self.http.request(method, url);
        if let Some(cred) = credential {
            builder = builder.basic_auth(&cred.username, Some(&cred.secret));
        }
        builder.build().map_err(ApiError::Transport)
    }
}

#[async_trait]
impl SocialApi for RestClient {
    async fn send(
        &self,
        method: Method,
        path: &str,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse> {
        let request = self.build_request(method, path, credential)?;
        debug!(method = %request.method(), url = %request.url(), "sending api request");
        let response = self.http.execute(request).await.map_err(ApiError::Transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(ApiError::Transport)?;
        Ok(ApiResponse { status, body })
    }
}

/// `GET /accounts/{handle}/followers?page=N`
pub fn followers_path(handle: &str, page: i64) -> String {
    format!("/accounts/{handle}/followers?page={page}")
}

/// `GET /self/followers?page=N`, the authenticated target's own followers.
pub fn self_followers_path(page: i64) -> String {
    format!("/self/followers?page={page}")
}

/// `PUT`/`DELETE` path for the authenticated target's relationship to `handle`.
pub fn following_path(handle: &str) -> String {
    format!("/self/following/{handle}")
}
