// src/tokens.rs
use async_trait::async_trait;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::{hash_map::Entry, HashMap};
use tracing::{debug, warn};

use crate::error::{ExplainError, Result};
use crate::labels::AddressLabeler;
use crate::models::{AccountKey, TokenBalanceRow, TokenBalanceSnapshot};
use crate::rpc::RpcClient;

/// Resolves the wallet that owns a token account
#[async_trait]
pub trait OwnerResolver: Send + Sync {
    async fn owner_of(&self, token_account: &str) -> Option<String>;
}

/// Reads `info.owner` from the jsonParsed SPL token account
pub struct RpcOwnerResolver {
    rpc: RpcClient,
}

impl RpcOwnerResolver {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl OwnerResolver for RpcOwnerResolver {
    async fn owner_of(&self, token_account: &str) -> Option<String> {
        match self.rpc.get_account_info(token_account).await {
            Ok(Some(value)) => value
                .pointer("/data/parsed/info/owner")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            Ok(None) => None,
            Err(e) => {
                debug!("owner lookup for {} failed: {}", token_account, e);
                None
            }
        }
    }
}

/// What to do with a row whose token-account owner cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedOwnerPolicy {
    #[default]
    Drop,
    Keep,
}

struct PendingRow {
    account_address: String,
    mint: String,
    pre_amount: Decimal,
    post_amount: Decimal,
    meta_owner: Option<String>, // owner as reported in the snapshot
}

/// Zero carrying the other side's scale so deltas keep mint precision
fn zero_like(amount: Decimal) -> Decimal {
    Decimal::new(0, amount.scale())
}

fn account_address(account_keys: &[AccountKey], index: usize) -> Result<String> {
    account_keys
        .get(index)
        .map(|k| k.address.clone())
        .ok_or_else(|| {
            ExplainError::MalformedTransactionMeta(format!(
                "token balance references account index {index} of {}",
                account_keys.len()
            ))
        })
}

/// Union of pre/post snapshots keyed by account index; pre order first, then post-only additions.
/// Rows are unique per (account, mint).
fn pair_snapshots(
    pre: &[TokenBalanceSnapshot],
    post: &[TokenBalanceSnapshot],
    account_keys: &[AccountKey],
) -> Result<Vec<PendingRow>> {
    let post_by_index: HashMap<usize, &TokenBalanceSnapshot> =
        post.iter().rev().map(|s| (s.account_index, s)).collect();

    let mut order: Vec<usize> = Vec::new();
    let mut pre_by_index: HashMap<usize, &TokenBalanceSnapshot> = HashMap::new();
    for s in pre {
        // first snapshot wins
        if let Entry::Vacant(slot) = pre_by_index.entry(s.account_index) {
            slot.insert(s);
            order.push(s.account_index);
        }
    }
    for s in post {
        if !pre_by_index.contains_key(&s.account_index) && !order.contains(&s.account_index) {
            order.push(s.account_index);
        }
    }

    let mut rows = Vec::with_capacity(order.len());
    for index in order {
        let before = pre_by_index.get(&index).copied();
        let after = post_by_index.get(&index).copied();
        let address = account_address(account_keys, index)?;
        let row = |s: &TokenBalanceSnapshot, pre_amount, post_amount| PendingRow {
            account_address: address.clone(),
            mint: s.mint.clone(),
            pre_amount,
            post_amount,
            meta_owner: s.owner.clone(),
        };

        match (before, after) {
            (Some(b), Some(a)) if b.mint == a.mint => rows.push(row(a, b.amount, a.amount)),
            (Some(b), Some(a)) => {
                // closed and re-opened for another mint: one row per mint
                warn!(
                    "token account {} changed mint {} -> {} within the transaction",
                    address, b.mint, a.mint
                );
                rows.push(row(b, b.amount, zero_like(b.amount)));
                rows.push(row(a, zero_like(a.amount), a.amount));
            }
            (Some(b), None) => rows.push(row(b, b.amount, zero_like(b.amount))),
            (None, Some(a)) => rows.push(row(a, zero_like(a.amount), a.amount)),
            (None, None) => {}
        }
    }

    Ok(rows)
}

/// Token balance rows enriched with mint and owner names.
///
/// Owner and name lookups run concurrently; output keeps snapshot order.
pub async fn reconcile(
    pre_token_balances: &[TokenBalanceSnapshot],
    post_token_balances: &[TokenBalanceSnapshot],
    account_keys: &[AccountKey],
    owners: &dyn OwnerResolver,
    labeler: &dyn AddressLabeler,
    policy: UnresolvedOwnerPolicy,
) -> Result<Vec<TokenBalanceRow>> {
    let pending = pair_snapshots(pre_token_balances, post_token_balances, account_keys)?;

    let mut mints: Vec<String> = Vec::new();
    for row in &pending {
        if !mints.contains(&row.mint) {
            mints.push(row.mint.clone());
        }
    }

    let (owner_results, mint_names) = tokio::join!(
        join_all(pending.iter().map(|r| owners.owner_of(&r.account_address))),
        join_all(mints.iter().map(|m| labeler.display_name(m))),
    );
    let mint_names: HashMap<String, String> = mints.into_iter().zip(mint_names).collect();

    let owner_names = join_all(
        owner_results
            .iter()
            .map(|o| async move {
                match o {
                    Some(owner) => Some(labeler.display_name(owner).await),
                    None => None,
                }
            }),
    )
    .await;

    let mut rows = Vec::with_capacity(pending.len());
    for ((row, owner), owner_name) in pending.into_iter().zip(owner_results).zip(owner_names) {
        if owner.is_none() && policy == UnresolvedOwnerPolicy::Drop {
            warn!(
                "dropping token row: {} (meta owner: {})",
                ExplainError::OwnerUnresolved(row.account_address),
                row.meta_owner.as_deref().unwrap_or("none")
            );
            continue;
        }

        let mint_display_name = mint_names
            .get(row.mint.as_str())
            .cloned()
            .unwrap_or_else(|| row.mint.clone());

        rows.push(TokenBalanceRow {
            delta: row.post_amount - row.pre_amount,
            account_address: row.account_address,
            mint: row.mint,
            pre_amount: row.pre_amount,
            post_amount: row.post_amount,
            owner_address: owner,
            mint_display_name,
            owner_display_name: owner_name,
        });
    }

    Ok(rows)
}
