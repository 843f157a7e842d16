// src/pipeline.rs
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::balances;
use crate::error::{ExplainError, Result};
use crate::labels::AddressLabeler;
use crate::models::TransactionView;
use crate::parser::{self, TransactionDetails};
use crate::rpc::RpcClient;
use crate::tokens::{self, OwnerResolver, UnresolvedOwnerPolicy};

/// Supplies decoded transaction metadata for a signature
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn fetch(&self, signature: &str) -> Result<TransactionDetails>;
}

#[async_trait]
impl TransactionSource for RpcClient {
    async fn fetch(&self, signature: &str) -> Result<TransactionDetails> {
        parser::validate_signature(signature)?;
        let raw = self
            .get_transaction(signature)
            .await?
            .ok_or_else(|| ExplainError::TransactionNotFound(signature.to_string()))?;
        parser::decode_transaction(raw)
    }
}

/// Builds the per-page view: balance deltas and token rows, computed side by side
pub struct Explorer {
    pub source: Arc<dyn TransactionSource>,
    pub owners: Arc<dyn OwnerResolver>,
    pub labeler: Arc<dyn AddressLabeler>,
    pub owner_policy: UnresolvedOwnerPolicy,
}

impl Explorer {
    pub async fn transaction_view(&self, signature: &str) -> Result<TransactionView> {
        let details = self.source.fetch(signature).await?;

        let (deltas, token_rows) = tokio::join!(
            balances::compute(
                &details.account_keys,
                &details.pre_balances,
                &details.post_balances,
                &details.program_ids,
                self.labeler.as_ref(),
            ),
            tokens::reconcile(
                &details.pre_token_balances,
                &details.post_token_balances,
                &details.account_keys,
                self.owners.as_ref(),
                self.labeler.as_ref(),
                self.owner_policy,
            ),
        );
        let (deltas, token_rows) = (deltas?, token_rows?);

        info!(
            "🔎 {} → {} accounts, {} token rows, {} log lines",
            signature,
            deltas.len(),
            token_rows.len(),
            details.log_messages.len()
        );

        Ok(TransactionView {
            overview: details.overview(),
            balance_changes: deltas,
            token_balance_changes: token_rows,
            log_messages: details.log_messages,
        })
    }
}
