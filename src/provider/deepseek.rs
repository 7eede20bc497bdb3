//! DeepSeek backend over raw HTTP.
//!
//! DeepSeek speaks the OpenAI wire format, but the graph stage uses the
//! legacy `/completions` endpoint (plain `prompt`, answer in
//! `choices[0].text`), which the chat-only `edgequake-llm` providers do not
//! cover. So this client drives `reqwest` directly.
//!
//! ## Retry
//!
//! Only timeouts are retried, immediately and up to
//! [`DeepSeekOptions::max_attempts`] attempts in total. A non-success status
//! or connection failure is returned on the first occurrence.

use super::{classify_status, ProviderClient, ProviderKind};
use crate::error::{Pdf2GraphError, ProviderError};
use crate::prompts::{graph_prompt, narrative_user_message, NARRATIVE_SYSTEM_PROMPT};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const PROVIDER: &str = "deepseek";

const NARRATIVE_MAX_TOKENS: u32 = 6000;
const GRAPH_MAX_TOKENS: u32 = 6000;
const TEMPERATURE: f32 = 0.7;

/// Connection settings for [`DeepSeekClient`].
#[derive(Clone)]
pub struct DeepSeekOptions {
    pub api_key: String,
    /// Base URL, e.g. `https://api.deepseek.com/v1`.
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl fmt::Debug for DeepSeekOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepSeekOptions")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Outcome of one HTTP attempt.
pub(crate) enum Attempt<T> {
    Done(Result<T, ProviderError>),
    TimedOut,
}

/// Run `op` until it finishes without timing out, at most `max_attempts` times.
pub(crate) async fn retry_on_timeout<T, F, Fut>(
    provider: &str,
    max_attempts: u32,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Attempt::Done(result) => return result,
            Attempt::TimedOut => {
                warn!(
                    "{}: request timed out (attempt {}/{})",
                    provider, attempt, max_attempts
                );
            }
        }
    }
    Err(ProviderError::Timeout {
        provider: provider.to_string(),
        attempts: max_attempts,
    })
}

/// Client for a DeepSeek (or compatible) endpoint.
pub struct DeepSeekClient {
    http: reqwest::Client,
    opts: DeepSeekOptions,
}

impl DeepSeekClient {
    pub fn new(opts: DeepSeekOptions) -> Result<Self, Pdf2GraphError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(opts.timeout_secs.max(1)))
            .build()
            .map_err(|e| Pdf2GraphError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { http, opts })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.opts.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ProviderError> {
        let url = self.endpoint(path);
        let url = url.as_str();
        let body = &body;
        retry_on_timeout(PROVIDER, self.opts.max_attempts, move |attempt| {
            debug!("POST {} (attempt {})", url, attempt);
            self.attempt(url, body)
        })
        .await
    }

    async fn attempt(&self, url: &str, body: &Value) -> Attempt<Value> {
        let transport = |e: reqwest::Error| {
            Attempt::Done(Err(ProviderError::Transport {
                provider: PROVIDER.to_string(),
                detail: e.to_string(),
            }))
        };

        let response = match self
            .http
            .post(url)
            .bearer_auth(&self.opts.api_key)
            .json(body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Attempt::TimedOut,
            Err(e) => return transport(e),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) if e.is_timeout() => return Attempt::TimedOut,
            Err(e) => return transport(e),
        };

        if !status.is_success() {
            warn!("{}: HTTP {} from {}", PROVIDER, status.as_u16(), url);
            return Attempt::Done(Err(classify_status(PROVIDER, status.as_u16(), &text, url)));
        }

        Attempt::Done(serde_json::from_str(&text).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER.to_string(),
            detail: format!("response is not JSON: {e}"),
        }))
    }
}

fn malformed(detail: &str) -> ProviderError {
    ProviderError::MalformedResponse {
        provider: PROVIDER.to_string(),
        detail: detail.to_string(),
    }
}

/// `choices[0].message.content` of a chat completion.
fn chat_content(body: &Value) -> Result<String, ProviderError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| malformed("missing choices[0].message.content"))
}

/// `choices[0].text` of a plain completion.
fn completion_text(body: &Value) -> Result<String, ProviderError> {
    body.pointer("/choices/0/text")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| malformed("missing choices[0].text"))
}

#[async_trait]
impl ProviderClient for DeepSeekClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    async fn generate_narrative(&self, text: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.opts.model,
            "messages": [
                { "role": "system", "content": NARRATIVE_SYSTEM_PROMPT },
                { "role": "user", "content": narrative_user_message(text) },
            ],
            "max_tokens": NARRATIVE_MAX_TOKENS,
            "temperature": TEMPERATURE,
        });
        let response = self.post("chat/completions", body).await?;
        chat_content(&response)
    }

    async fn generate_graph(&self, text: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.opts.model,
            "prompt": graph_prompt(text, false),
            "max_tokens": GRAPH_MAX_TOKENS,
            "temperature": TEMPERATURE,
        });
        let response = self.post("completions", body).await?;
        completion_text(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn retries_only_timeouts() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, _> = tokio_test::block_on(retry_on_timeout("deepseek", 3, |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Attempt::TimedOut
                } else {
                    Attempt::Done(Ok("ok"))
                }
            }
        }));
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_timeout("deepseek", 3, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::TimedOut }
        })
        .await;
        assert_eq!(
            result.unwrap_err(),
            ProviderError::Timeout {
                provider: "deepseek".into(),
                attempts: 3
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_timeout("deepseek", 3, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Attempt::Done(Err(ProviderError::Transport {
                    provider: "deepseek".into(),
                    detail: "connection reset".into(),
                }))
            }
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Transport { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn response_field_extraction() {
        let chat = json!({"choices":[{"message":{"content":"  Narrative.  "}}]});
        assert_eq!(chat_content(&chat).unwrap(), "Narrative.");
        let completion = json!({"choices":[{"text":"{\"nodes\":[],\"links\":[]}\n"}]});
        assert_eq!(completion_text(&completion).unwrap(), "{\"nodes\":[],\"links\":[]}");
        assert!(matches!(
            completion_text(&json!({"choices":[]})),
            Err(ProviderError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = DeepSeekClient::new(options("http://localhost:1/v1/", 1, 1)).unwrap();
        assert_eq!(client.endpoint("completions"), "http://localhost:1/v1/completions");
    }

    fn options(base_url: &str, timeout_secs: u64, max_attempts: u32) -> DeepSeekOptions {
        DeepSeekOptions {
            api_key: "test-key".into(),
            base_url: base_url.into(),
            model: "deepseek-chat".into(),
            timeout_secs,
            max_attempts,
        }
    }

    /// Serve one canned HTTP response per connection, forever.
    async fn canned_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}/v1")
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length")
                            .then(|| v.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn graph_call_reads_completion_text() {
        let base = canned_server(
            "200 OK",
            r#"{"choices":[{"text":"Here: {\"nodes\":[],\"links\":[]}"}]}"#,
        )
        .await;
        let client = DeepSeekClient::new(options(&base, 5, 3)).unwrap();
        let raw = client.generate_graph("Cells divide.").await.unwrap();
        assert_eq!(raw, r#"Here: {"nodes":[],"links":[]}"#);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_invalid_credentials() {
        let base = canned_server("401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let client = DeepSeekClient::new(options(&base, 5, 3)).unwrap();
        let err = client.generate_narrative("Cells divide.").await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::InvalidCredentials {
                provider: "deepseek".into()
            }
        );
    }

    #[tokio::test]
    async fn silent_server_times_out_after_all_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = DeepSeekClient::new(options(&format!("http://{addr}"), 1, 2)).unwrap();
        let err = client.generate_narrative("x").await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Timeout {
                provider: "deepseek".into(),
                attempts: 2
            }
        );
    }
}
