//! Thin client for the OpenRouter chat-completions endpoint.

use anyhow::anyhow;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

pub const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Text fragments in arrival order
pub type FragmentStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

#[derive(Clone)]
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// One-shot completion. `content` is the user message content array, so image parts
    /// can ride along with the text prompt.
    pub async fn complete(
        &self,
        model: &str,
        content: Vec<Value>,
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        let payload = json!({
            "model": model,
            "messages": [
                {
                    "role": "user",
                    "content": content
                }
            ],
            "max_tokens": max_tokens
        });

        let response = self
            .http
            .post(OPENROUTER_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM API request failed: {}", response.status()));
        }

        let response_json: Value = response.json().await?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid response format from LLM"))?;

        Ok(content.to_string())
    }

    /// Streaming completion of a single text prompt
    pub async fn stream_chat(
        &self,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> anyhow::Result<FragmentStream> {
        let payload = json!({
            "model": model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": temperature,
            "stream": true
        });

        let response = self
            .http
            .post(OPENROUTER_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM API request failed: {}", response.status()));
        }

        Ok(sse_fragments(response.bytes_stream()))
    }
}

/// One line of a server-sent-event body
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    Fragment(String),
    Done,
    Error(String),
    Skip,
}

pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    // Blank keep-alives and ": OPENROUTER PROCESSING" comments
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let Ok(event) = serde_json::from_str::<Value>(data) else {
        debug!(line = %data, "skipping unparseable stream line");
        return SseLine::Skip;
    };

    if let Some(message) = event["error"]["message"].as_str() {
        return SseLine::Error(message.to_string());
    }

    match event["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => SseLine::Fragment(text.to_string()),
        _ => SseLine::Skip,
    }
}

struct SseState<S> {
    body: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<anyhow::Result<String>>,
    finished: bool,
}

impl<S> SseState<S> {
    /// Parse every complete line in the buffer. Lines are split on raw bytes so a
    /// multi-byte character spanning two chunks is decoded whole.
    fn drain_lines(&mut self, flush: bool) {
        while !self.finished {
            let line = match self.buffer.iter().position(|b| *b == b'\n') {
                Some(pos) => self.buffer.drain(..=pos).collect::<Vec<u8>>(),
                None if flush && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
                None => break,
            };
            match parse_sse_line(&String::from_utf8_lossy(&line)) {
                SseLine::Fragment(text) => self.pending.push_back(Ok(text)),
                SseLine::Error(message) => {
                    self.pending.push_back(Err(anyhow!("LLM stream error: {}", message)));
                    self.finished = true;
                }
                SseLine::Done => self.finished = true,
                SseLine::Skip => {}
            }
        }
    }
}

/// Turn a raw SSE byte stream into content fragments. The stream ends at `[DONE]`,
/// at an error event, or when the body ends.
pub fn sse_fragments<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines(false);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(anyhow::Error::new(e)), state));
                }
                None => {
                    state.drain_lines(true);
                    state.finished = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    type ChunkStream = futures::stream::Iter<std::vec::IntoIter<Result<Vec<u8>, std::io::Error>>>;

    fn chunks(parts: Vec<&[u8]>) -> ChunkStream {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.into_iter().map(|p| Ok(p.to_vec())).collect();
        futures::stream::iter(owned)
    }

    async fn collect(stream: FragmentStream) -> Vec<String> {
        stream
            .map(|item| item.unwrap_or_else(|e| format!("ERR {e}")))
            .collect()
            .await
    }

    #[test]
    fn parses_delta_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Step 1"}}]}"#),
            SseLine::Fragment("Step 1".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": OPENROUTER PROCESSING"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
        assert_eq!(
            parse_sse_line(r#"data: {"error":{"message":"rate limited"}}"#),
            SseLine::Error("rate limited".to_string())
        );
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_chunks() {
        let body = chunks(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel"[..],
            &b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n"[..],
            &b"data: [DONE]\n"[..],
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n"[..],
        ]);
        assert_eq!(collect(sse_fragments(body)).await, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn multibyte_characters_survive_chunk_boundaries() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"படி\"}}]}\n".as_bytes();
        // Cut inside the last Tamil character
        let (head, tail) = line.split_at(line.len() - 8);

        assert_eq!(collect(sse_fragments(chunks(vec![head, tail]))).await, vec!["படி"]);
    }

    #[tokio::test]
    async fn final_line_without_newline_is_flushed() {
        let body = chunks(vec![&b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"[..]]);
        assert_eq!(collect(sse_fragments(body)).await, vec!["tail"]);
    }

    #[tokio::test]
    async fn error_event_ends_stream() {
        let body = chunks(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n"[..],
            &b"data: {\"error\":{\"message\":\"boom\"}}\n"[..],
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n"[..],
        ]);
        assert_eq!(
            collect(sse_fragments(body)).await,
            vec!["partial".to_string(), "ERR LLM stream error: boom".to_string()]
        );
    }
}
