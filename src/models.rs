// src/models.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an account reference came from in the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum KeySource {
    #[default]
    Transaction,
    LookupTable,
}

/// One entry of the message account list, in on-chain order (index 0 pays the fee)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKey {
    pub address: String,
    pub is_signer: bool,
    pub is_writable: bool,
    #[serde(default)]
    pub source: KeySource,
}

impl AccountKey {
    pub fn new(address: impl Into<String>, is_signer: bool, is_writable: bool) -> Self {
        Self {
            address: address.into(),
            is_signer,
            is_writable,
            source: KeySource::Transaction,
        }
    }

    #[cfg(test)]
    pub fn from_lookup_table(mut self) -> Self {
        self.source = KeySource::LookupTable;
        self
    }
}

/// Role badges shown next to an account. Declaration order is render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoleFlag {
    FeePayer,
    Signer,
    Writable,
    LookupTable,
    Program,
}

impl RoleFlag {
    pub fn label(self) -> &'static str {
        match self {
            RoleFlag::FeePayer => "Fee Payer",
            RoleFlag::Signer => "Signer",
            RoleFlag::Writable => "Writable",
            RoleFlag::LookupTable => "Address Table Lookup",
            RoleFlag::Program => "Program",
        }
    }
}

impl fmt::Display for RoleFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Native balance change of a single account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDeltaRecord {
    pub account_index: usize,
    pub address: String,
    pub pre_lamports: u64,
    pub post_lamports: u64,
    pub delta: i64, // post - pre, exact
    pub display_name: String,
    #[serde(default)]
    pub role_flags: Vec<RoleFlag>,
}

impl BalanceDeltaRecord {
    #[cfg(test)]
    pub fn has_role(&self, flag: RoleFlag) -> bool {
        self.role_flags.contains(&flag)
    }

    /// Role labels joined by a space, e.g. "Fee Payer Signer Writable"
    pub fn role_annotation(&self) -> String {
        self.role_flags
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A pre- or post-execution SPL token balance as reported in transaction meta
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalanceSnapshot {
    pub account_index: usize,
    pub mint: String,
    pub amount: Decimal, // scaled by the mint's decimals
    pub owner: Option<String>,
}

/// Token balance change of one token account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceRow {
    pub account_address: String,
    pub mint: String,
    pub pre_amount: Decimal,
    pub post_amount: Decimal,
    pub delta: Decimal,
    pub owner_address: Option<String>,
    pub mint_display_name: String,
    pub owner_display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Body posted to the explanation route
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub signature: String,
    #[serde(default)]
    pub log_messages: Vec<String>,
    #[serde(default)]
    pub balance_changes: Vec<BalanceDeltaRecord>,
    #[serde(default)]
    pub token_balance_changes: Vec<TokenBalanceRow>,
}

/// Summary header of a transaction page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOverview {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<String>, // RFC3339
    pub fee: u64,
    pub success: bool,
    pub error_reason: Option<String>,
}

/// Everything the page needs to render tables and to ask for an explanation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub overview: TransactionOverview,
    pub balance_changes: Vec<BalanceDeltaRecord>,
    pub token_balance_changes: Vec<TokenBalanceRow>,
    pub log_messages: Vec<String>,
}
