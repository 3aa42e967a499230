use serde_json::{json, Value};
use termlens::{ComprehensionError, Understanding};

pub const SCHEMA_VERSION: u64 = 1;

/// Short, actionable advice per error kind. Never includes secrets or request data.
pub fn error_hint(kind: &str) -> Option<&'static str> {
    match kind {
        "empty_query" => Some("Pass a non-blank query, e.g. `termlens explain \"quantum entanglement\"`."),
        "search_failed" => Some(
            "The search page could not be fetched. Check network/proxy settings; HTTP 429/503 usually means rate limiting, so retry later.",
        ),
        "invalid_url" => Some("The search URL could not be built from the extracted keywords."),
        "content_extraction_failed" => Some(
            "The search page used a character set that could not be decoded. Retry, or try a different --locale.",
        ),
        "parsing_failed" => Some(
            "The model did not return the expected JSON block. Try a larger or instruction-tuned model via --model.",
        ),
        "model_error" => Some(
            "The model call failed. Is Ollama running (TERMLENS_OLLAMA_BASE_URL) and is the model pulled (`ollama pull <model>`)?",
        ),
        _ => None,
    }
}

pub fn explain_ok(u: &Understanding) -> Value {
    json!({
        "schema_version": SCHEMA_VERSION,
        "kind": "explain",
        "ok": true,
        "understanding": u,
    })
}

pub fn explain_err(query: &str, e: &ComprehensionError) -> Value {
    json!({
        "schema_version": SCHEMA_VERSION,
        "kind": "explain",
        "ok": false,
        "query": query,
        "error": {
            "code": e.kind(),
            "message": e.detail(),
            "status": e.status(),
            "hint": error_hint(e.kind()).unwrap_or(""),
        },
    })
}

/// Human-readable rendering for `--output text`.
pub fn explain_text(u: &Understanding) -> String {
    let mut out = String::new();
    out.push_str(u.query.trim());
    out.push_str(&format!("\n  category:   {}", u.category));
    out.push_str(&format!("\n  confidence: {:.2}", u.confidence));
    out.push_str(&format!("\n\n{}\n", u.definition.trim()));
    if !u.concepts.is_empty() {
        out.push_str("\nrelated:\n");
        for c in &u.concepts {
            out.push_str(&format!("  - {c}\n"));
        }
    }
    out
}
