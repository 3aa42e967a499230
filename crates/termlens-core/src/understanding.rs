use serde::{Deserialize, Serialize};

/// Ordered, non-empty keyword list. Order is extractor-assigned relevance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeywordList(Vec<String>);

impl KeywordList {
    /// Normalize raw extractor output.
    ///
    /// Entries are trimmed and empties dropped. When nothing survives, the trimmed query
    /// becomes the only keyword, so later stages always have something to search for.
    /// Returns `None` only when the query itself is blank.
    pub fn from_extracted(raw: Vec<String>, query: &str) -> Option<Self> {
        let kept: Vec<String> = raw
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if !kept.is_empty() {
            return Some(Self(kept));
        }
        let q = query.trim();
        if q.is_empty() {
            None
        } else {
            Some(Self(vec![q.to_string()]))
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

/// Model output before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub definition: String,
    pub category: String,
    pub concepts: Vec<String>,
    pub confidence: f64,
}

/// Terminal output of a successful comprehension run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Understanding {
    /// The input query exactly as the caller passed it.
    pub query: String,
    pub definition: String,
    pub category: String,
    pub concepts: Vec<String>,
    /// In `[0, 1]`.
    pub confidence: f64,
}

impl Understanding {
    pub fn from_analysis(query: &str, a: AnalysisResult) -> Self {
        Self {
            query: query.to_string(),
            definition: a.definition,
            category: a.category,
            concepts: a.concepts,
            confidence: a.confidence,
        }
    }
}

/// Every way a comprehension run can fail. Callers only ever see this type.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ComprehensionError {
    #[error("empty query: {0}")]
    EmptyQuery(String),
    #[error("search failed: {detail}")]
    SearchFailed { status: Option<u16>, detail: String },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("content extraction failed: {0}")]
    ContentExtractionFailed(String),
    #[error("parsing failed: {0}")]
    ParsingFailed(String),
    #[error("model error: {0}")]
    ModelError(String),
    #[error("{0}")]
    General(String),
}

impl ComprehensionError {
    /// Stable snake_case tag, used in machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyQuery(_) => "empty_query",
            Self::SearchFailed { .. } => "search_failed",
            Self::InvalidUrl(_) => "invalid_url",
            Self::ContentExtractionFailed(_) => "content_extraction_failed",
            Self::ParsingFailed(_) => "parsing_failed",
            Self::ModelError(_) => "model_error",
            Self::General(_) => "general_error",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::EmptyQuery(d)
            | Self::InvalidUrl(d)
            | Self::ContentExtractionFailed(d)
            | Self::ParsingFailed(d)
            | Self::ModelError(d)
            | Self::General(d) => d,
            Self::SearchFailed { detail, .. } => detail,
        }
    }

    /// HTTP status for `SearchFailed` when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::SearchFailed { status, .. } => *status,
            _ => None,
        }
    }
}
