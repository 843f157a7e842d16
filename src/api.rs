use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ExplainError, Result};
use crate::models::{ExplainRequest, TransactionView};
use crate::pipeline::Explorer;
use crate::prompt::NarrativePromptBuilder;
use crate::relay::{CompletionClient, TracingObserver};

/// Process-wide handles, built once in `main` and shared by every request
pub struct AppState {
    pub explorer: Explorer,
    pub completion: CompletionClient,
    pub prompt: NarrativePromptBuilder,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Transaction explainer API running" }))
        .route("/tx/:signature", get(transaction_view))
        .route("/api/ai", post(explain))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(cfg: Config, state: Arc<AppState>) -> eyre::Result<()> {
    let addr = SocketAddr::from((cfg.bind_addr, cfg.port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state).into_make_service()).await?;

    Ok(())
}

async fn transaction_view(
    State(state): State<Arc<AppState>>,
    Path(signature): Path<String>,
) -> Result<Json<TransactionView>> {
    Ok(Json(state.explorer.transaction_view(&signature).await?))
}

/// Streams raw assistant text back as a chunked `text/plain` body
async fn explain(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExplainRequest>,
) -> Result<Response> {
    if !state.completion.is_configured() {
        return Err(ExplainError::CompletionDisabled);
    }

    let prompt = state.prompt.build(
        &req.signature,
        &req.balance_changes,
        &req.token_balance_changes,
        &req.log_messages,
    );

    let request_id = Uuid::new_v4().to_string();
    info!(
        request_id = %request_id,
        signature = %req.signature,
        accounts = req.balance_changes.len(),
        token_rows = req.token_balance_changes.len(),
        log_lines = req.log_messages.len(),
        prior_messages = req.messages.len(),
        prompt = %prompt,
        "New Chat"
    );

    let observer = TracingObserver {
        request_id,
        signature: req.signature,
    };
    let relay = state
        .completion
        .submit(prompt, req.messages, Some(Box::new(observer)))
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(relay),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionConfig;
    use crate::labels::fakes::StaticLabeler;
    use crate::parser::sample_transaction;
    use crate::pipeline::fakes::FixedSource;
    use crate::tokens::{fakes::StaticOwners, UnresolvedOwnerPolicy};
    use serde_json::{json, Value};
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state(completion_url: String, api_key: Option<&str>) -> Arc<AppState> {
        Arc::new(AppState {
            explorer: Explorer {
                source: Arc::new(FixedSource(sample_transaction())),
                owners: Arc::new(StaticOwners::with(&[("TokenAcct111", "Payer111")])),
                labeler: Arc::new(StaticLabeler::default()),
                owner_policy: UnresolvedOwnerPolicy::Drop,
            },
            completion: CompletionClient::new(CompletionConfig {
                base_url: completion_url,
                api_key: api_key.map(str::to_string),
                api_version: None,
                model: "gpt-4".into(),
                timeout: Duration::from_secs(5),
                idle_timeout: Duration::from_secs(5),
            })
            .unwrap(),
            prompt: NarrativePromptBuilder::new(true),
        })
    }

    async fn spawn(state: Arc<AppState>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state).into_make_service()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn serves_transaction_view_as_json() {
        let base = spawn(state("http://127.0.0.1:9".into(), None)).await;

        let body: Value = reqwest::get(format!("{}/tx/anything", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["overview"]["fee"], 5000);
        assert_eq!(body["balanceChanges"][0]["delta"], -5000);
        assert_eq!(body["balanceChanges"][0]["roleFlags"], json!(["feePayer", "signer", "writable"]));
        assert_eq!(body["tokenBalanceChanges"][0]["delta"], "-1.000000");
    }

    #[tokio::test]
    async fn explain_streams_plain_text() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("No token account changes"))
            .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Alice paid \"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"Bob 5 lamports.\"}}]}\n\n",
                "data: [DONE]\n\n"
            )))
            .mount(&upstream)
            .await;

        let base = spawn(state(upstream.uri(), Some("key"))).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/ai", base))
            .json(&json!({
                "messages": [{ "role": "user", "content": "What happened?" }],
                "signature": "sig",
                "logMessages": [],
                "balanceChanges": [],
                "tokenBalanceChanges": []
            }))
            .send()
            .await
            .unwrap();

        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE.as_str()],
            "text/plain; charset=utf-8"
        );
        assert_eq!(resp.text().await.unwrap(), "Alice paid Bob 5 lamports.");
    }

    #[tokio::test]
    async fn explain_without_api_key_is_unavailable() {
        let base = spawn(state("http://127.0.0.1:9".into(), None)).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/ai", base))
            .json(&json!({ "signature": "sig" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 503);
    }

    #[tokio::test]
    async fn upstream_failure_before_first_chunk_is_bad_gateway() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&upstream)
            .await;

        let base = spawn(state(upstream.uri(), Some("key"))).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/ai", base))
            .json(&json!({ "signature": "sig" }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 502);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("400"));
    }
}
