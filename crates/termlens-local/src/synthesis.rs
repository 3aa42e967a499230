//! Synthesis stage: build the model request, accumulate the streamed answer, pull out the
//! structured block and validate it.

use futures_util::StreamExt;
use termlens_core::{
    AnalysisResult, ChatClient, ChatMessage, ChatOptions, ChatRequest, ChatStream,
    ComprehensionError, KeywordList, Understanding,
};

pub const SYSTEM_PROMPT: &str = "\
You explain unfamiliar terms. Analyze the search evidence you are given and answer in the \
same language as the user's query.

Reply with exactly one fenced ```json block containing a single JSON object with exactly \
these four fields:
- \"definition\": string, a concise definition of the term
- \"category\": string, the field or domain the term belongs to
- \"concepts\": array of strings, closely related concepts
- \"confidence\": number between 0 and 1, how certain you are given the evidence

Do not add any other fields. If the evidence is empty or irrelevant, answer from general \
knowledge and lower the confidence.";

/// Progress through the synthesis stage. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisPhase {
    Built,
    Streaming,
    Accumulated,
    Extracted,
    Parsed,
    Done,
}

impl SynthesisPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Streaming => "streaming",
            Self::Accumulated => "accumulated",
            Self::Extracted => "extracted",
            Self::Parsed => "parsed",
            Self::Done => "done",
        }
    }
}

/// A synthesis failure together with the phase it happened in.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisFailure {
    pub phase: SynthesisPhase,
    pub error: ComprehensionError,
}

pub fn build_request(model: &str, query: &str, keywords: &KeywordList, evidence: &str) -> ChatRequest {
    let user = format!(
        "Query: {query}\nKeywords: {}\n\nSearch evidence:\n{evidence}",
        keywords.join(", ")
    );
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)],
        options: ChatOptions::deterministic(),
    }
}

/// Drain the chunk stream in arrival order into one string.
pub async fn accumulate(mut stream: ChatStream) -> Result<String, ComprehensionError> {
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ComprehensionError::ModelError(e.to_string()))?;
        if let Some(content) = chunk.content {
            out.push_str(&content);
        }
    }
    Ok(out)
}

/// Interior of the first fenced block (```` ``` ```` with an optional info string).
///
/// Without a complete fenced block the whole response is returned, trimmed.
pub fn extract_structured_block(text: &str) -> &str {
    const FENCE: &str = "```";
    let Some(open) = text.find(FENCE) else {
        return text.trim();
    };
    let after_open = &text[open + FENCE.len()..];
    // The info string ("json", "JSON", ...) is a tag only when whitespace follows it,
    // on the fence line or not. "```true```" keeps `true` as the body.
    let tag_len = after_open
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after_open.len());
    let body = match after_open[tag_len..].chars().next() {
        Some(c) if tag_len > 0 && c.is_whitespace() => &after_open[tag_len..],
        _ => after_open,
    };
    match body.find(FENCE) {
        Some(close) => body[..close].trim(),
        None => text.trim(),
    }
}

/// Decode the block into the four required fields and range-check the confidence.
pub fn parse_analysis(block: &str) -> Result<AnalysisResult, ComprehensionError> {
    let parsed: AnalysisResult =
        serde_json::from_str(block).map_err(|e| ComprehensionError::ParsingFailed(e.to_string()))?;
    if !parsed.confidence.is_finite() || !(0.0..=1.0).contains(&parsed.confidence) {
        return Err(ComprehensionError::ParsingFailed(format!(
            "confidence {} is outside [0, 1]",
            parsed.confidence
        )));
    }
    Ok(parsed)
}

/// Run the whole stage against `chat`.
///
/// `on_phase` is called on every forward transition; the pipeline uses it for tracing.
pub async fn synthesize(
    chat: &dyn ChatClient,
    model: &str,
    query: &str,
    keywords: &KeywordList,
    evidence: &str,
    mut on_phase: impl FnMut(SynthesisPhase),
) -> Result<Understanding, SynthesisFailure> {
    let fail =
        |phase: SynthesisPhase| move |error: ComprehensionError| SynthesisFailure { phase, error };

    let req = build_request(model, query, keywords, evidence);
    on_phase(SynthesisPhase::Built);
    let stream = chat
        .chat(&req)
        .await
        .map_err(|e| ComprehensionError::ModelError(e.to_string()))
        .map_err(fail(SynthesisPhase::Built))?;
    on_phase(SynthesisPhase::Streaming);
    let text = accumulate(stream)
        .await
        .map_err(fail(SynthesisPhase::Streaming))?;
    on_phase(SynthesisPhase::Accumulated);
    let block = extract_structured_block(&text);
    on_phase(SynthesisPhase::Extracted);
    let analysis = parse_analysis(block).map_err(fail(SynthesisPhase::Extracted))?;
    on_phase(SynthesisPhase::Parsed);
    let understanding = Understanding::from_analysis(query, analysis);
    on_phase(SynthesisPhase::Done);
    Ok(understanding)
}
