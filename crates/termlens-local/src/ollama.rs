use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use termlens_core::{ChatChunk, ChatClient, ChatMessage, ChatRequest, ChatStream, Error, Result};

use crate::env;

/// Streaming client for Ollama's `/api/chat` (newline-delimited JSON).
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        let base_url =
            env("TERMLENS_OLLAMA_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:11434".to_string());
        Self::new(client, base_url)
    }

    fn endpoint_chat(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl ChatClient for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatStream> {
        let body = WireRequest {
            model: &req.model,
            messages: &req.messages,
            stream: true,
            options: WireOptions {
                temperature: req.options.temperature,
                top_p: req.options.top_p,
                top_k: req.options.top_k,
            },
        };

        let resp = self
            .client
            .post(self.endpoint_chat())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::Llm(format!(
                "ollama chat HTTP {status}: {}",
                detail.trim()
            )));
        }

        Ok(ndjson_chunks(Box::pin(resp.bytes_stream())))
    }
}

/// Split a byte stream into NDJSON lines and decode each into a [`ChatChunk`].
///
/// Transport errors end the stream after being yielded once.
fn ndjson_chunks<S, B, E>(bytes: S) -> ChatStream
where
    S: futures_util::Stream<Item = std::result::Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<S> {
        bytes: S,
        buf: Vec<u8>,
        eof: bool,
    }

    let init = State {
        bytes,
        buf: Vec::new(),
        eof: false,
    };
    futures_util::stream::unfold(init, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                match parse_line(&line) {
                    Some(item) => return Some((item, st)),
                    None => continue,
                }
            }
            if st.eof {
                let rest = std::mem::take(&mut st.buf);
                return parse_line(&rest).map(|item| (item, st));
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.buf.clear();
                    st.eof = true;
                    return Some((Err(Error::Llm(format!("stream read failed: {e}"))), st));
                }
                None => st.eof = true,
            }
        }
    })
    .boxed()
}

fn parse_line(line: &[u8]) -> Option<Result<ChatChunk>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    let parsed: WireChunk = match serde_json::from_slice(line) {
        Ok(v) => v,
        Err(e) => return Some(Err(Error::Llm(format!("bad stream chunk: {e}")))),
    };
    if let Some(err) = parsed.error {
        return Some(Err(Error::Llm(err)));
    }
    Some(Ok(ChatChunk {
        content: parsed.message.map(|m| m.content),
    }))
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: WireOptions,
}

#[derive(Debug, Serialize)]
struct WireOptions {
    temperature: f64,
    top_p: f64,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}
