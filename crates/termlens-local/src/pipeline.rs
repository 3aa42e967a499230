//! The comprehension pipeline: validate, extract keywords, retrieve evidence, synthesize.
//!
//! Each stage awaits the previous one; the first failure ends the run. Dropping the
//! returned future cancels whatever fetch or model stream is in flight.

use std::num::NonZeroUsize;
use std::sync::Arc;
use termlens_core::{
    ChatClient, ComprehensionError, Error, FetchBackend, HtmlToText, KeywordExtractor,
    KeywordList, Understanding,
};

use crate::extract::Html2TextConverter;
use crate::keywords::TokenKeywordExtractor;
use crate::ollama::OllamaClient;
use crate::synthesis::{self, SynthesisFailure};
use crate::{env, retrieval, LocalFetcher};

pub const DEFAULT_MODEL: &str = "qwen2.5:3b-instruct";
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Per-invocation tuning. Immutable once built.
#[derive(Clone)]
pub struct Config {
    pub model: String,
    pub search_limit: NonZeroUsize,
    /// Language hint forwarded to the search surface (`hl`). `None` omits it.
    pub locale: Option<String>,
    /// Where pipeline events go. `None` means no events at all, not the global default.
    pub logger: Option<tracing::Dispatch>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("model", &self.model)
            .field("search_limit", &self.search_limit)
            .field("locale", &self.locale)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            search_limit: NonZeroUsize::new(DEFAULT_SEARCH_LIMIT).unwrap_or(NonZeroUsize::MIN),
            locale: None,
            logger: None,
        }
    }
}

impl Config {
    /// Defaults overridden by `TERMLENS_MODEL`, `TERMLENS_SEARCH_LIMIT`, `TERMLENS_LOCALE`.
    ///
    /// A zero or unparseable search limit is ignored. Without `TERMLENS_LOCALE` the language
    /// hint comes from the process locale (`LC_ALL`, `LC_MESSAGES`, `LANG`).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(m) = env("TERMLENS_MODEL") {
            cfg.model = m;
        }
        if let Some(n) = env("TERMLENS_SEARCH_LIMIT")
            .and_then(|s| s.parse::<usize>().ok())
            .and_then(NonZeroUsize::new)
        {
            cfg.search_limit = n;
        }
        cfg.locale = match env("TERMLENS_LOCALE") {
            Some(l) => retrieval::language_hint(&l),
            None => retrieval::locale_hint_from_env(),
        };
        cfg
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_search_limit(mut self, limit: NonZeroUsize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_logger(mut self, logger: tracing::Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Run `f` against the configured logger; no-op without one.
    fn trace(&self, f: impl FnOnce()) {
        if let Some(d) = &self.logger {
            tracing::dispatcher::with_default(d, f);
        }
    }
}

/// Reject blank queries before any I/O happens.
pub fn validate_query(query: &str) -> Result<&str, ComprehensionError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ComprehensionError::EmptyQuery(
            "query is empty or whitespace-only".to_string(),
        ));
    }
    Ok(trimmed)
}

/// The four collaborators a run needs. Shared read-only across invocations.
#[derive(Clone)]
pub struct Pipeline {
    keywords: Arc<dyn KeywordExtractor>,
    transport: Arc<dyn FetchBackend>,
    chat: Arc<dyn ChatClient>,
    converter: Arc<dyn HtmlToText>,
}

impl Pipeline {
    pub fn new(
        keywords: Arc<dyn KeywordExtractor>,
        transport: Arc<dyn FetchBackend>,
        chat: Arc<dyn ChatClient>,
        converter: Arc<dyn HtmlToText>,
    ) -> Self {
        Self {
            keywords,
            transport,
            chat,
            converter,
        }
    }

    /// Local defaults: lexical keywords, reqwest transport, Ollama from env, html2text.
    pub fn local_from_env() -> termlens_core::Result<Self> {
        let client = crate::default_http_client()?;
        Ok(Self::new(
            Arc::new(TokenKeywordExtractor::default()),
            Arc::new(LocalFetcher::new(client.clone())),
            Arc::new(OllamaClient::from_env(client)),
            Arc::new(Html2TextConverter::default()),
        ))
    }

    async fn extract_keywords(
        &self,
        query: &str,
        config: &Config,
    ) -> Result<KeywordList, ComprehensionError> {
        let raw = self
            .keywords
            .extract(query)
            .await
            .map_err(wrap_extractor_error)?;
        let raw_count = raw.len();
        let usable = raw.iter().filter(|k| !k.trim().is_empty()).count();
        let list = KeywordList::from_extracted(raw, query).ok_or_else(|| {
            ComprehensionError::EmptyQuery("query is empty or whitespace-only".to_string())
        })?;
        config.trace(|| {
            tracing::debug!(
                keywords = ?list.as_slice(),
                extracted = raw_count,
                fallback = usable == 0,
                "keywords extracted"
            )
        });
        Ok(list)
    }

    /// Run one query through every stage.
    pub async fn comprehend(
        &self,
        query: &str,
        config: &Config,
    ) -> Result<Understanding, ComprehensionError> {
        let out = self.run(query, config).await;
        if let Err(e) = &out {
            config.trace(|| {
                tracing::warn!(kind = e.kind(), error = %e, "comprehension failed")
            });
        }
        out
    }

    async fn run(&self, query: &str, config: &Config) -> Result<Understanding, ComprehensionError> {
        validate_query(query)?;

        let keywords = self.extract_keywords(query, config).await?;

        let url = retrieval::build_search_url(
            &keywords,
            config.search_limit,
            config.locale.as_deref(),
        )?;
        config.trace(|| tracing::debug!(url = %url, "search url built"));

        let evidence =
            retrieval::fetch_evidence(self.transport.as_ref(), self.converter.as_ref(), &url)
                .await?;
        config.trace(|| {
            tracing::debug!(
                status = evidence.status,
                charset = evidence.charset.encoding.name(),
                charset_source = ?evidence.charset.source,
                chars = evidence.text.chars().count(),
                "evidence retrieved"
            )
        });

        synthesis::synthesize(
            self.chat.as_ref(),
            &config.model,
            query,
            &keywords,
            &evidence.text,
            |phase| config.trace(|| tracing::trace!(phase = phase.as_str(), "synthesis")),
        )
        .await
        .map_err(|SynthesisFailure { phase, error }| {
            config.trace(|| {
                tracing::debug!(phase = phase.as_str(), model = %config.model, "synthesis failed")
            });
            error
        })
    }
}

fn wrap_extractor_error(e: Error) -> ComprehensionError {
    ComprehensionError::General(match e {
        Error::Keywords(d) => format!("keyword extraction failed: {d}"),
        other => format!("keyword extraction failed: {other}"),
    })
}

/// One-shot entry point wired to the local defaults.
///
/// `config` defaults to [`Config::from_env`].
pub async fn comprehend(
    query: &str,
    config: Option<Config>,
) -> Result<Understanding, ComprehensionError> {
    validate_query(query)?;
    let config = config.unwrap_or_else(Config::from_env);
    let pipeline = Pipeline::local_from_env()
        .map_err(|e| ComprehensionError::General(format!("pipeline setup failed: {e}")))?;
    pipeline.comprehend(query, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_query_trims_whitespace_and_newlines() {
        assert_eq!(validate_query("  term \n").unwrap(), "term");
        for q in ["", "   ", "\n\t  \r\n"] {
            let err = validate_query(q).unwrap_err();
            assert_eq!(err.kind(), "empty_query", "{q:?}");
        }
    }

    #[test]
    fn config_debug_does_not_dump_the_logger() {
        let cfg = Config::default().with_logger(tracing::Dispatch::none());
        let s = format!("{cfg:?}");
        assert!(s.contains("logger: true"), "{s}");
        assert_eq!(cfg.search_limit.get(), DEFAULT_SEARCH_LIMIT);
        assert_eq!(cfg.model, DEFAULT_MODEL);
    }

    #[test]
    fn default_config_has_no_locale_hint() {
        assert_eq!(Config::default().locale, None);
    }

    #[tokio::test]
    async fn one_shot_entry_rejects_blank_query_before_setup() {
        let err = comprehend(" \n ", None).await.unwrap_err();
        assert_eq!(err.kind(), "empty_query");
    }
}
