//! Public facade crate for `termlens`.
//!
//! Re-exports the backend-agnostic types/traits from `termlens-core` plus the pipeline entry
//! points from `termlens-local`, so embedders depend on one crate.

pub use termlens_core::*;
pub use termlens_local::pipeline::{comprehend, validate_query, Config, Pipeline};
pub use termlens_local::retrieval::{language_hint, SEARCH_ENDPOINT};

/// Concrete collaborators, for callers that want to wire a [`Pipeline`] by hand.
pub mod local {
    pub use termlens_local::extract::Html2TextConverter;
    pub use termlens_local::keywords::TokenKeywordExtractor;
    pub use termlens_local::ollama::OllamaClient;
    pub use termlens_local::{default_http_client, LocalFetcher};
}
