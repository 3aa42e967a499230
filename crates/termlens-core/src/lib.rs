use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod understanding;

pub use understanding::{AnalysisResult, ComprehensionError, KeywordList, Understanding};

/// Backend-level failures reported by collaborators (transport, model, extractor).
///
/// The pipeline never surfaces these directly; each stage re-tags them into
/// [`ComprehensionError`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("keyword extraction failed: {0}")]
    Keywords(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A plain GET. Timeouts and headers are left to the transport's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Header names are lower-case.
    pub headers: BTreeMap<String, String>,
    pub bytes: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Content-Type`, preferring the dedicated field and falling back to the header map.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref().or_else(|| {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                .map(|(_, v)| v.as_str())
        })
    }
}

#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

#[async_trait::async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Ordered by relevance, most relevant first.
    async fn extract(&self, query: &str) -> Result<Vec<String>>;
}

pub trait HtmlToText: Send + Sync {
    /// Best-effort; degrades to partial or empty text rather than failing.
    fn to_plain_text(&self, html: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Decoding knobs forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
}

impl ChatOptions {
    /// Greedy decoding: same input, same output.
    pub fn deterministic() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            top_k: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: ChatOptions,
}

/// One incremental piece of a streamed model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub content: Option<String>,
}

impl ChatChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}

/// Dropping the stream must tear down the underlying connection.
pub type ChatStream = BoxStream<'static, Result<ChatChunk>>;

#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    fn name(&self) -> &'static str;
    async fn chat(&self, req: &ChatRequest) -> Result<ChatStream>;
}
