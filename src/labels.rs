// src/labels.rs
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ExplainError, Result};

/// Maps an address to something a person can read. Never fails: unknown or
/// unreachable lookups fall back to the address itself.
#[async_trait]
pub trait AddressLabeler: Send + Sync {
    async fn display_name(&self, address: &str) -> String;
}

/// Programs and sysvars share addresses across clusters
fn known_program(address: &str) -> Option<&'static str> {
    Some(match address {
        "11111111111111111111111111111111" => "System Program",
        "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA" => "Token Program",
        "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb" => "Token-2022 Program",
        "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL" => "Associated Token Program",
        "ComputeBudget111111111111111111111111111111" => "Compute Budget Program",
        "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr" => "Memo Program",
        "Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo" => "Memo Program v1",
        "AddressLookupTab1e1111111111111111111111111" => "Address Lookup Table Program",
        "Vote111111111111111111111111111111111111111" => "Vote Program",
        "Stake11111111111111111111111111111111111111" => "Stake Program",
        "BPFLoaderUpgradeab1e11111111111111111111111" => "BPF Upgradeable Loader",
        "BPFLoader2111111111111111111111111111111111" => "BPF Loader 2",
        "SysvarC1ock11111111111111111111111111111111" => "Clock Sysvar",
        "SysvarRent111111111111111111111111111111111" => "Rent Sysvar",
        "SysvarRecentB1ockHashes11111111111111111111" => "Recent Blockhashes Sysvar",
        "Sysvar1nstructions1111111111111111111111111" => "Instructions Sysvar",
        "So11111111111111111111111111111111111111112" => "Wrapped SOL",
        _ => return None,
    })
}

fn known_mainnet_mint(address: &str) -> Option<&'static str> {
    Some(match address {
        "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v" => "USD Coin (USDC)",
        "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB" => "USDT (USDT)",
        _ => return None,
    })
}

const LABEL_CACHE_LIMIT: usize = 10_000;

#[derive(Debug, Deserialize)]
struct TokenInfo {
    name: Option<String>,
    symbol: Option<String>,
}

impl TokenInfo {
    fn label(self) -> Option<String> {
        let name = self.name.filter(|s| !s.trim().is_empty());
        let symbol = self.symbol.filter(|s| !s.trim().is_empty());
        match (name, symbol) {
            (Some(n), Some(s)) => Some(format!("{} ({})", n, s)),
            (Some(n), None) => Some(n),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        }
    }
}

/// Labels found on the token list, keyed by (cluster, address). Oldest entry
/// goes first once `limit` is reached.
struct LabelCache {
    entries: HashMap<(String, String), String>,
    order: VecDeque<(String, String)>,
    limit: usize,
}

impl LabelCache {
    fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            limit,
        }
    }

    fn get(&self, key: &(String, String)) -> Option<&String> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: (String, String), label: String) {
        if self.entries.insert(key.clone(), label).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Static table first, then an optional token-metadata endpoint, with a
/// bounded process-wide cache of the labels it returns.
pub struct TokenListLabeler {
    cluster: String,
    token_list_url: Option<String>,
    client: Client,
    cache: Mutex<LabelCache>,
}

impl TokenListLabeler {
    pub fn new(cluster: impl Into<String>, token_list_url: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self {
            cluster: cluster.into(),
            token_list_url,
            client,
            cache: Mutex::new(LabelCache::new(LABEL_CACHE_LIMIT)),
        })
    }

    /// Ok(None) means the endpoint answered and has no entry for the address
    async fn fetch_token_label(&self, base: &str, address: &str) -> Result<Option<String>> {
        let url = format!("{}/{}", base.trim_end_matches('/'), address);
        let resp = self.client.get(&url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let text = resp.text().await?;
                if text.trim().is_empty() || text.trim() == "null" {
                    return Ok(None);
                }
                let info: TokenInfo = serde_json::from_str(&text)?;
                Ok(info.label())
            }
            s => Err(ExplainError::LookupFailure {
                address: address.to_string(),
                reason: format!("token list answered HTTP {s}"),
            }),
        }
    }
}

#[async_trait]
impl AddressLabeler for TokenListLabeler {
    async fn display_name(&self, address: &str) -> String {
        if let Some(name) = known_program(address) {
            return name.to_string();
        }
        if self.cluster == "mainnet-beta" {
            if let Some(name) = known_mainnet_mint(address) {
                return name.to_string();
            }
        }

        let key = (self.cluster.clone(), address.to_string());
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return hit.clone();
        }

        let Some(base) = self.token_list_url.as_deref() else {
            return address.to_string();
        };

        match self.fetch_token_label(base, address).await {
            Ok(Some(label)) => {
                self.cache.lock().await.insert(key, label.clone());
                label
            }
            // misses are not cached
            Ok(None) => address.to_string(),
            Err(e) => {
                let e = match e {
                    e @ ExplainError::LookupFailure { .. } => e,
                    other => ExplainError::LookupFailure {
                        address: address.to_string(),
                        reason: other.to_string(),
                    },
                };
                debug!("label fallback: {}", e);
                address.to_string()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;

    /// Fixed table, raw address for everything else
    #[derive(Default)]
    pub struct StaticLabeler(pub HashMap<String, String>);

    impl StaticLabeler {
        pub fn with(pairs: &[(&str, &str)]) -> Self {
            Self(
                pairs
                    .iter()
                    .map(|(a, n)| (a.to_string(), n.to_string()))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl AddressLabeler for StaticLabeler {
        async fn display_name(&self, address: &str) -> String {
            self.0
                .get(address)
                .cloned()
                .unwrap_or_else(|| address.to_string())
        }
    }
}
