//! Quiz backend contract
//!
//! Question generation and scoring are external. The controller only relies on
//! the request/response shapes of four calls:
//!
//! - `POST /generate-quiz?num_questions=N`
//! - `POST /submit-answer`
//! - `POST /update-confidence`
//! - `GET /quiz-results/{session_id}`

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::error::ProctorError;
use crate::types::{
    ConfidenceAck, GenerateQuizRequest, GenerateQuizResponse, QuizResults, SubmitAnswerRequest,
    SubmitAnswerResponse, UpdateConfidenceRequest,
};

#[async_trait]
pub trait QuizBackend: Send + Sync {
    async fn generate_quiz(
        &self,
        request: &GenerateQuizRequest,
    ) -> Result<GenerateQuizResponse, ProctorError>;

    async fn submit_answer(
        &self,
        request: &SubmitAnswerRequest,
    ) -> Result<SubmitAnswerResponse, ProctorError>;

    async fn update_confidence(
        &self,
        request: &UpdateConfidenceRequest,
    ) -> Result<ConfidenceAck, ProctorError>;

    async fn quiz_results(&self, session_id: &str) -> Result<QuizResults, ProctorError>;
}

/// A backend call prepared by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    Generate(GenerateQuizRequest),
    Submit(Box<SubmitAnswerRequest>),
    UpdateConfidence(UpdateConfidenceRequest),
    Results { session_id: String },
}

/// Outcome of a [`BackendRequest`], ready to hand back to the controller
#[derive(Debug)]
pub enum BackendReply {
    Generate(Result<GenerateQuizResponse, ProctorError>),
    Submit(Result<SubmitAnswerResponse, ProctorError>),
    UpdateConfidence(Result<ConfidenceAck, ProctorError>),
    Results(Result<QuizResults, ProctorError>),
}

impl BackendRequest {
    pub fn endpoint(&self) -> &'static str {
        match self {
            BackendRequest::Generate(_) => "generate-quiz",
            BackendRequest::Submit(_) => "submit-answer",
            BackendRequest::UpdateConfidence(_) => "update-confidence",
            BackendRequest::Results { .. } => "quiz-results",
        }
    }

    /// Perform the call. Failures are carried in the reply, never lost.
    pub async fn dispatch<B: QuizBackend + ?Sized>(self, backend: &B) -> BackendReply {
        match self {
            BackendRequest::Generate(request) => {
                BackendReply::Generate(backend.generate_quiz(&request).await)
            }
            BackendRequest::Submit(request) => {
                BackendReply::Submit(backend.submit_answer(&request).await)
            }
            BackendRequest::UpdateConfidence(request) => {
                BackendReply::UpdateConfidence(backend.update_confidence(&request).await)
            }
            BackendRequest::Results { session_id } => {
                BackendReply::Results(backend.quiz_results(&session_id).await)
            }
        }
    }
}

/// HTTP implementation over reqwest
#[derive(Debug, Clone)]
pub struct HttpQuizBackend {
    client: Client,
    base_url: String,
}

impl HttpQuizBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ProctorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, ProctorError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(endpoint, status = status.as_u16(), "backend call failed");
            return Err(ProctorError::NetworkFailure(format!(
                "{} returned HTTP {}: {}",
                endpoint,
                status.as_u16(),
                body
            )));
        }
        response.json::<T>().await.map_err(|e| {
            ProctorError::NetworkFailure(format!("{} returned an unreadable body: {}", endpoint, e))
        })
    }
}

#[async_trait]
impl QuizBackend for HttpQuizBackend {
    async fn generate_quiz(
        &self,
        request: &GenerateQuizRequest,
    ) -> Result<GenerateQuizResponse, ProctorError> {
        let response = self
            .client
            .post(self.url("generate-quiz"))
            .query(&[("num_questions", request.num_questions)])
            .json(request)
            .send()
            .await?;
        Self::read_json("generate-quiz", response).await
    }

    async fn submit_answer(
        &self,
        request: &SubmitAnswerRequest,
    ) -> Result<SubmitAnswerResponse, ProctorError> {
        let response = self
            .client
            .post(self.url("submit-answer"))
            .json(request)
            .send()
            .await?;
        Self::read_json("submit-answer", response).await
    }

    async fn update_confidence(
        &self,
        request: &UpdateConfidenceRequest,
    ) -> Result<ConfidenceAck, ProctorError> {
        let response = self
            .client
            .post(self.url("update-confidence"))
            .json(request)
            .send()
            .await?;
        Self::read_json("update-confidence", response).await
    }

    async fn quiz_results(&self, session_id: &str) -> Result<QuizResults, ProctorError> {
        let response = self
            .client
            .get(self.url(&format!("quiz-results/{}", session_id)))
            .send()
            .await?;
        Self::read_json("quiz-results", response).await
    }
}
