//! reqwest client for the user service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::UserService;
use super::types::{BioCheck, CreateUserRequest, CreatedUser, EnrichmentOptions, UploadedImage};
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::onboarding::answers::{AnswerRecord, ProfileFields};
use crate::onboarding::session::SessionId;
use crate::onboarding::validate::PhotoUpload;

/// Header carrying the session correlation id.
pub const SESSION_HEADER: &str = "X-Session-Id";

/// HTTP implementation of [`UserService`].
#[derive(Clone)]
pub struct HttpUserService {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpUserService {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send with the session header and turn non-2xx into `ServiceError::Api`.
    async fn send(
        &self,
        op: &str,
        session: SessionId,
        request: RequestBuilder,
    ) -> Result<Response, ServiceError> {
        let start = Instant::now();
        let response = request
            .header(SESSION_HEADER, session.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout {
                        timeout: self.timeout,
                    }
                } else {
                    ServiceError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(
                op,
                session = %session,
                status = status.as_u16(),
                "User service call rejected"
            );
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!(
            op,
            session = %session,
            latency_ms = start.elapsed().as_millis(),
            "User service call succeeded"
        );
        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
        response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
    }
}

#[async_trait]
impl UserService for HttpUserService {
    async fn create_user(
        &self,
        session: SessionId,
        fields: &ProfileFields,
    ) -> Result<CreatedUser, ServiceError> {
        let body = CreateUserRequest {
            session_id: session,
            fields,
        };
        let request = self.client.post(self.url("/users")).json(&body);
        let response = self.send("create_user", session, request).await?;
        Self::parse(response).await
    }

    async fn update_user(
        &self,
        session: SessionId,
        user_id: Option<&str>,
        fields: &AnswerRecord,
    ) -> Result<(), ServiceError> {
        let path = match user_id {
            Some(id) => format!("/users/{id}"),
            None => format!("/sessions/{session}/answers"),
        };
        let request = self.client.patch(self.url(&path)).json(fields);
        self.send("update_user", session, request).await?;
        Ok(())
    }

    async fn check_bio_uniqueness(
        &self,
        session: SessionId,
        bio: &str,
    ) -> Result<bool, ServiceError> {
        let request = self
            .client
            .get(self.url("/users/bio-exists"))
            .query(&[("bio", bio)]);
        let response = self.send("check_bio", session, request).await?;
        let check: BioCheck = Self::parse(response).await?;
        Ok(check.exists)
    }

    async fn upload_photo(
        &self,
        session: SessionId,
        photo: &PhotoUpload,
    ) -> Result<UploadedImage, ServiceError> {
        let part = Part::bytes(photo.bytes.clone())
            .file_name(photo.file_name.clone())
            .mime_str(&photo.content_type)?;
        let form = Form::new()
            .text("sessionId", session.to_string())
            .part("file", part);
        let request = self.client.post(self.url("/images")).multipart(form);
        let response = self.send("upload_photo", session, request).await?;
        Self::parse(response).await
    }

    async fn trigger_enrichment(
        &self,
        session: SessionId,
        user_id: &str,
        options: &EnrichmentOptions,
    ) -> Result<(), ServiceError> {
        let request = self
            .client
            .post(self.url(&format!("/users/{user_id}/enrich")))
            .json(options);
        self.send("trigger_enrichment", session, request).await?;
        Ok(())
    }
}
