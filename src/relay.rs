// src/relay.rs
use async_stream::try_stream;
use futures_util::stream::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::Serialize;
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tracing::{info, warn};

use crate::config::CompletionConfig;
use crate::error::{ExplainError, Result};
use crate::models::ChatMessage;
use crate::sse::{SseDecoder, SseEvent};

const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Receives the full assistant text once the upstream stream ends cleanly
pub trait CompletionObserver: Send + Sync {
    fn on_completion(&self, completion: &str);
}

/// Logs the finished exchange, correlated with the "New Chat" event by id
pub struct TracingObserver {
    pub request_id: String,
    pub signature: String,
}

impl CompletionObserver for TracingObserver {
    fn on_completion(&self, completion: &str) {
        info!(
            request_id = %self.request_id,
            signature = %self.signature,
            completion_chars = completion.chars().count(),
            completion = %completion,
            "Chat Response"
        );
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Assistant text chunks in arrival order. Dropping it closes the upstream
/// connection.
pub struct RelayStream {
    chunks: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl Stream for RelayStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.as_mut().poll_next(cx)
    }
}

/// Chat-completion client, built once at startup and shared by all requests
pub struct CompletionClient {
    client: Client,
    cfg: CompletionConfig,
}

impl CompletionClient {
    pub fn new(cfg: CompletionConfig) -> Result<Self> {
        let client = Client::builder().connect_timeout(cfg.timeout).build()?;
        Ok(Self { client, cfg })
    }

    pub fn is_configured(&self) -> bool {
        self.cfg.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    async fn send_once(&self, key: &str, messages: &[ChatMessage]) -> Result<Response> {
        let mut req = self
            .client
            .post(self.endpoint())
            .bearer_auth(key)
            .header("api-key", key)
            .json(&CompletionRequest {
                model: &self.cfg.model,
                messages,
                stream: true,
            });
        if let Some(version) = &self.cfg.api_version {
            req = req.query(&[("api-version", version)]);
        }

        match tokio::time::timeout(self.cfg.timeout, req.send()).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ExplainError::UpstreamStreamFault(format!(
                "no response within {:?}",
                self.cfg.timeout
            ))),
        }
    }

    /// Open the stream; one retry for connect failures, timeouts and 5xx
    async fn open(&self, messages: &[ChatMessage]) -> Result<Response> {
        let key = self.cfg.api_key.as_deref().ok_or(ExplainError::CompletionDisabled)?;

        let mut attempt = 1;
        loop {
            let outcome = self.send_once(key, messages).await;
            let retryable = match &outcome {
                Ok(resp) => resp.status().is_server_error(),
                Err(ExplainError::Http(e)) => e.is_connect() || e.is_timeout(),
                Err(ExplainError::UpstreamStreamFault(_)) => true,
                Err(_) => false,
            };

            if retryable && attempt < 2 {
                warn!("⚠️ completion request failed (attempt {}), retrying", attempt);
                attempt += 1;
                tokio::time::sleep(RETRY_PAUSE).await;
                continue;
            }

            let resp = outcome?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ExplainError::UpstreamStreamFault(format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                )));
            }
            return Ok(resp);
        }
    }

    /// Send `prompt` as the first user message followed by the prior
    /// conversation and relay the streamed reply
    pub async fn submit(
        &self,
        prompt: String,
        prior_messages: Vec<ChatMessage>,
        observer: Option<Box<dyn CompletionObserver>>,
    ) -> Result<RelayStream> {
        let mut messages = Vec::with_capacity(prior_messages.len() + 1);
        messages.push(ChatMessage::user(prompt));
        messages.extend(prior_messages);

        let resp = self.open(&messages).await?;
        let idle = self.cfg.idle_timeout;

        let chunks = try_stream! {
            let mut body = resp.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut full = String::new();

            'read: loop {
                let next = tokio::time::timeout(idle, body.next())
                    .await
                    .map_err(|_| ExplainError::UpstreamStreamFault(format!("no data for {:?}", idle)))?;

                let (events, closed) = match next {
                    Some(bytes) => {
                        let bytes = bytes.map_err(|e| ExplainError::UpstreamStreamFault(e.to_string()))?;
                        (decoder.push(&bytes), false)
                    }
                    None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
                };

                for event in events {
                    match event {
                        SseEvent::Delta(text) => {
                            full.push_str(&text);
                            yield text;
                        }
                        SseEvent::Done => break 'read,
                        SseEvent::Error(message) => {
                            Err::<(), _>(ExplainError::UpstreamStreamFault(message))?;
                        }
                    }
                }

                if closed {
                    break;
                }
            }

            if let Some(observer) = observer {
                observer.on_completion(&full);
            }
        };

        Ok(RelayStream {
            chunks: Box::pin(chunks),
        })
    }
}
