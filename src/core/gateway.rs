//! Categorization gateway
//!
//! A `Categorizer` is the raw transport to a text classifier and may fail.
//! `CategorizationGateway` wraps one and applies the failure contract:
//! - classify never fails: errors and unknown labels become Uncategorized
//! - reconcile never fails: errors become empty lists

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::types::{normalize, CategoryLabel, ObjectId, Reconciliation, ResponseRecord};

lazy_static! {
    /// Markdown code fence some models wrap JSON replies in
    static ref RE_CODE_FENCE: Regex =
        Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").unwrap();
}

/// Raw classifier transport
#[async_trait]
pub trait Categorizer: Send + Sync {
    /// Label for one use; ideally a sentinel or an exact taxonomy entry
    async fn classify(
        &self,
        use_text: &str,
        object: ObjectId,
        taxonomy: &[&str],
    ) -> Result<String, GatewayError>;

    /// Batch verdict over all responses of a phase
    async fn reconcile(
        &self,
        object: ObjectId,
        responses: &[String],
    ) -> Result<Reconciliation, GatewayError>;
}

/// Transport used when no classifier is reachable or configured
#[derive(Debug, Default)]
pub struct OfflineCategorizer;

#[async_trait]
impl Categorizer for OfflineCategorizer {
    async fn classify(&self, _: &str, _: ObjectId, _: &[&str]) -> Result<String, GatewayError> {
        Err(GatewayError::Offline)
    }

    async fn reconcile(&self, _: ObjectId, _: &[String]) -> Result<Reconciliation, GatewayError> {
        Err(GatewayError::Offline)
    }
}

// =============================================================================
// OpenAI-compatible transport
// =============================================================================

const CLASSIFY_SYSTEM_PROMPT: &str =
    "You categorize uses of objects into creativity related categories.";

const RECONCILE_SYSTEM_PROMPT: &str =
    "You are an expert in categorizing creative responses and spotting invalid inputs.";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    fn user(content: String) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat-completions client for an OpenAI-compatible endpoint
#[derive(Clone)]
pub struct OpenAiCategorizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiCategorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCategorizer")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCategorizer {
    /// Build from config, reading the key from the configured env var
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GatewayError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &GatewayConfig, api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        let body: ChatResponse = resp.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(GatewayError::EmptyReply)
    }
}

#[async_trait]
impl Categorizer for OpenAiCategorizer {
    async fn classify(
        &self,
        use_text: &str,
        object: ObjectId,
        taxonomy: &[&str],
    ) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(CLASSIFY_SYSTEM_PROMPT),
                ChatMessage::user(classify_prompt(use_text, object, taxonomy)),
            ],
            max_tokens: Some(20),
            temperature: None,
        };
        self.complete(&request).await
    }

    async fn reconcile(
        &self,
        object: ObjectId,
        responses: &[String],
    ) -> Result<Reconciliation, GatewayError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(RECONCILE_SYSTEM_PROMPT),
                ChatMessage::user(reconcile_prompt(object, responses)),
            ],
            max_tokens: None,
            temperature: Some(0.0),
        };
        let reply = self.complete(&request).await?;
        parse_reconciliation(&reply)
    }
}

fn classify_prompt(use_text: &str, object: ObjectId, taxonomy: &[&str]) -> String {
    let categories = serde_json::to_string(taxonomy).unwrap_or_default();
    format!(
        "Object: '{object}'\n\
         Proposed use: '{use_text}'\n\
         Allowed categories: {categories}\n\n\
         Reply with exactly one of:\n\
         - Disqualified (nonsense, irrelevant, or just repeats the object name)\n\
         - Uncategorized (legitimate but fits no category)\n\
         - one category name copied exactly from the list.\n\
         No explanation."
    )
}

fn reconcile_prompt(object: ObjectId, responses: &[String]) -> String {
    let listed = serde_json::to_string(responses).unwrap_or_default();
    format!(
        "Object: '{object}'\n\
         Proposed uses: {listed}\n\n\
         Return a JSON object with keys 'disqualified' (uses that are nonsense, \
         irrelevant, or repeat the object name, copied verbatim) and \
         'used_categories' (categories assigned to the legitimate uses)."
    )
}

/// Parse a batch reply, tolerating a surrounding markdown code fence
pub fn parse_reconciliation(reply: &str) -> Result<Reconciliation, GatewayError> {
    let body = RE_CODE_FENCE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply);
    serde_json::from_str(body.trim()).map_err(|e| GatewayError::Malformed(e.to_string()))
}

/// Restrict a raw label to the allowed set
///
/// Sentinels and exact entries pass through. Entries differing only in case,
/// quotes or a trailing period map to the canonical entry. Anything else is
/// Uncategorized.
pub fn coerce_label(raw: &str, taxonomy: &[&str]) -> CategoryLabel {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '.' || c == '"' || c == '\'');
    match CategoryLabel::from(cleaned.to_string()) {
        CategoryLabel::Category(name) => {
            let key = normalize(&name);
            taxonomy
                .iter()
                .find(|entry| normalize(entry) == key)
                .map(|entry| CategoryLabel::Category(entry.to_string()))
                .unwrap_or(CategoryLabel::Uncategorized)
        }
        sentinel => sentinel,
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Failure-tolerant front for a `Categorizer`
#[derive(Clone)]
pub struct CategorizationGateway {
    transport: Arc<dyn Categorizer>,
}

impl std::fmt::Debug for CategorizationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategorizationGateway").finish_non_exhaustive()
    }
}

impl CategorizationGateway {
    pub fn new(transport: Arc<dyn Categorizer>) -> Self {
        Self { transport }
    }

    /// Gateway that labels everything Uncategorized
    pub fn offline() -> Self {
        Self::new(Arc::new(OfflineCategorizer))
    }

    /// Classify against the object's full taxonomy
    pub async fn classify(&self, use_text: &str, object: ObjectId) -> CategoryLabel {
        let taxonomy = object.categories();
        match self.transport.classify(use_text, object, taxonomy).await {
            Ok(raw) => {
                let label = coerce_label(&raw, taxonomy);
                if label == CategoryLabel::Uncategorized && normalize(&raw) != "uncategorized" {
                    tracing::debug!(raw = %raw, object = %object, "label outside taxonomy");
                }
                label
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    object = %object,
                    "classify failed, using Uncategorized"
                );
                CategoryLabel::Uncategorized
            }
        }
    }

    /// Batch verdict; empty on failure
    pub async fn reconcile(
        &self,
        object: ObjectId,
        responses: &[ResponseRecord],
    ) -> Reconciliation {
        let texts: Vec<String> = responses.iter().map(|r| r.use_text.clone()).collect();
        match self.transport.reconcile(object, &texts).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, object = %object, "reconcile failed, keeping labels");
                Reconciliation::default()
            }
        }
    }
}
