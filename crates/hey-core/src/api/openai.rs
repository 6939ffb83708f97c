//! OpenAI-compatible chat completions over HTTP.
//!
//! Works against api.openai.com and any server speaking the same
//! `/chat/completions` dialect (local runners, proxies).

use super::provider::{Completion, CompletionProvider, DeltaStream};
use crate::config::CompletionConfig;
use crate::context::Message;
use crate::error::{ProviderError, ProviderErrorKind};
use futures_util::{Stream, StreamExt, stream};
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::fmt;

/// Longest slice of an error body quoted back to the user.
const ERROR_BODY_MAX_CHARS: usize = 300;

#[derive(Debug, Clone, Default)]
pub struct OpenAiProvider {
    client: Client,
}

impl OpenAiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    async fn send(
        &self,
        config: &CompletionConfig,
        body: &Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = endpoint(&config.base_url);
        debug!("POST {} (model {}, stream {})", url, config.model, config.stream);

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        if let Some(key) = config.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ProviderError {
            kind: classify_status(status),
            message: format!("API error ({}): {}", status, error_detail(&body)),
        })
    }
}

impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        config: &CompletionConfig,
    ) -> Result<Completion, ProviderError> {
        let body = build_request_body(config, messages);
        let response = self.send(config, &body).await?;

        if config.stream {
            return Ok(Completion::Stream(sse_deltas(response.bytes_stream())));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::fatal(format!("invalid response body: {}", e)))?;
        let text = extract_choice_content(&json)?;
        Ok(Completion::Text(
            text.strip_prefix('\n').unwrap_or(&text).to_string(),
        ))
    }
}

fn endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Build the request body for the chat completions endpoint.
pub fn build_request_body(config: &CompletionConfig, messages: &[Message]) -> Value {
    let messages: Vec<Value> = messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": config.model,
        "messages": messages,
        "stream": config.stream,
    });
    if let Some(temp) = config.temperature {
        body["temperature"] = json!(temp);
    }
    body
}

/// Pull the reply out of a non-streaming response.
pub fn extract_choice_content(json: &Value) -> Result<String, ProviderError> {
    json["choices"]
        .get(0)
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::fatal(format!("unexpected response shape: {}", json)))
}

/// Rate limits, timeouts and server errors are worth retrying; anything
/// else (bad key, unknown model, malformed request) is not.
pub fn classify_status(status: StatusCode) -> ProviderErrorKind {
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ProviderErrorKind::Transient
    } else {
        ProviderErrorKind::Fatal
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        ProviderError::transient(format!("failed to send request: {}", e))
    } else {
        ProviderError::fatal(format!("failed to send request: {}", e))
    }
}

/// The provider's own error message if the body carries one, else the raw body.
fn error_detail(body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    if detail.chars().count() > ERROR_BODY_MAX_CHARS {
        let cut: String = detail.chars().take(ERROR_BODY_MAX_CHARS).collect();
        format!("{}...", cut)
    } else {
        detail
    }
}

/// Incremental Server-Sent Events decoder for streamed chat completions.
///
/// Bytes are buffered until a full line is available, so events and
/// multi-byte characters split across network chunks decode correctly.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
    seen_content: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            done: false,
            seen_content: false,
        }
    }

    /// True once `data: [DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes, returning the content fragments completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, ProviderError> {
        self.buffer.extend_from_slice(bytes);
        let mut deltas = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.done {
                continue;
            }
            if let Some(delta) = self.parse_line(&line[..line.len() - 1])? {
                deltas.push(delta);
            }
        }
        Ok(deltas)
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Result<Vec<String>, ProviderError> {
        let line = std::mem::take(&mut self.buffer);
        if self.done || line.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.parse_line(&line)?.into_iter().collect())
    }

    fn parse_line(&mut self, line: &[u8]) -> Result<Option<String>, ProviderError> {
        let line = std::str::from_utf8(line)
            .map_err(|e| ProviderError::fatal(format!("UTF-8 error in stream: {}", e)))?;
        let line = line.trim_end_matches('\r');

        // Comments, `event:` lines and keep-alive blanks carry no content.
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let json: Value = serde_json::from_str(data)
            .map_err(|e| ProviderError::fatal(format!("JSON parse error in stream: {}", e)))?;
        if let Some(message) = json["error"]["message"].as_str() {
            return Err(ProviderError::transient(format!("stream error: {}", message)));
        }

        let Some(content) = json["choices"]
            .get(0)
            .and_then(|choice| choice["delta"]["content"].as_str())
        else {
            return Ok(None);
        };

        let content = if self.seen_content {
            content
        } else {
            self.seen_content = true;
            content.strip_prefix('\n').unwrap_or(content)
        };
        Ok((!content.is_empty()).then(|| content.to_string()))
    }
}

struct SseState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Adapt a byte stream of SSE into a [`DeltaStream`].
///
/// A transport failure after the response started is transient: the
/// request itself was fine and may well succeed if repeated.
fn sse_deltas<S, B, E>(bytes: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.pending.pop_front() {
                return Some((Ok(delta), state));
            }
            if state.finished {
                return None;
            }

            let step = match state.bytes.next().await {
                Some(Ok(chunk)) => state.decoder.feed(chunk.as_ref()),
                Some(Err(e)) => Err(ProviderError::transient(format!(
                    "stream interrupted: {}",
                    e
                ))),
                None => {
                    state.finished = true;
                    state.decoder.finish()
                }
            };
            match step {
                Ok(deltas) => state.pending.extend(deltas),
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            }
            if state.decoder.is_done() {
                state.finished = true;
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Message;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_request_body() {
        let config = CompletionConfig {
            model: "gpt-4o".into(),
            temperature: Some(0.5),
            stream: true,
            ..Default::default()
        };
        let body = build_request_body(
            &config,
            &[Message::system("be brief"), Message::user("hi")],
        );
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body["messages"][1].get("created_at").is_none());
    }

    #[test]
    fn test_request_body_omits_unset_temperature() {
        let body = build_request_body(&CompletionConfig::default(), &[]);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(
            endpoint("http://localhost:8080/v1/"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_extract_choice_content() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": "Hi!"}}]});
        assert_eq!(extract_choice_content(&json).unwrap(), "Hi!");
        let err = extract_choice_content(&json!({"choices": []})).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            ProviderErrorKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            ProviderErrorKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::REQUEST_TIMEOUT),
            ProviderErrorKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            ProviderErrorKind::Fatal
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            ProviderErrorKind::Fatal
        );
    }

    #[test]
    fn test_error_detail_prefers_provider_message() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(error_detail(body), "Incorrect API key provided");
        assert_eq!(error_detail("  upstream down \n"), "upstream down");
    }

    #[test]
    fn test_decoder_basic_stream() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}{}data: [DONE]\n\n", chunk("Hel"), chunk("lo"));
        assert_eq!(decoder.feed(input.as_bytes()).unwrap(), vec!["Hel", "lo"]);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_decoder_line_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let input = chunk("Hello world");
        let (a, b) = input.as_bytes().split_at(17);
        assert!(decoder.feed(a).unwrap().is_empty());
        assert_eq!(decoder.feed(b).unwrap(), vec!["Hello world"]);
    }

    #[test]
    fn test_decoder_multibyte_split() {
        let mut decoder = SseDecoder::new();
        let input = chunk("日本");
        let bytes = input.as_bytes();
        let split = input.find('日').unwrap() + 1;
        assert!(decoder.feed(&bytes[..split]).unwrap().is_empty());
        assert_eq!(decoder.feed(&bytes[split..]).unwrap(), vec!["日本"]);
    }

    #[test]
    fn test_decoder_strips_first_leading_newline_only() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}{}", chunk("\nHi"), chunk("\nthere"));
        assert_eq!(decoder.feed(input.as_bytes()).unwrap(), vec!["Hi", "\nthere"]);
    }

    #[test]
    fn test_decoder_ignores_noise() {
        let mut decoder = SseDecoder::new();
        let input = format!(
            ": keep-alive\r\nevent: message\r\n{}data: {}\n",
            chunk("ok"),
            json!({"choices": [{"delta": {"role": "assistant"}}]})
        );
        assert_eq!(decoder.feed(input.as_bytes()).unwrap(), vec!["ok"]);
    }

    #[test]
    fn test_decoder_malformed_json_is_fatal() {
        let mut decoder = SseDecoder::new();
        let err = decoder.feed(b"data: {not json}\n").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_decoder_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        let input = chunk("tail");
        let input = input.trim_end();
        assert!(decoder.feed(input.as_bytes()).unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), vec!["tail"]);
    }

    #[tokio::test]
    async fn test_sse_deltas_from_chunked_body() {
        let body = format!("{}{}data: [DONE]\n\n{}", chunk("Hel"), chunk("lo"), chunk("ignored"));
        let pieces: Vec<Result<Vec<u8>, String>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let deltas: Vec<String> = sse_deltas(stream::iter(pieces))
            .map(|d| d.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_sse_deltas_transport_error_is_transient() {
        let pieces: Vec<Result<Vec<u8>, String>> = vec![
            Ok(chunk("Hel").into_bytes()),
            Err("connection reset".to_string()),
        ];
        let items: Vec<Result<String, ProviderError>> =
            sse_deltas(stream::iter(pieces)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Hel");
        assert!(items[1].as_ref().unwrap_err().is_transient());
    }
}
