// src/parser.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{ExplainError, Result};
use crate::models::{AccountKey, KeySource, TokenBalanceSnapshot, TransactionOverview};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedTransaction {
    slot: u64,
    block_time: Option<i64>,
    transaction: EncodedInner,
    meta: Option<EncodedMeta>,
}

#[derive(Debug, Deserialize)]
struct EncodedInner {
    signatures: Vec<String>,
    message: EncodedMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedMessage {
    account_keys: Vec<ParsedAccountKey>,
    #[serde(default)]
    instructions: Vec<ParsedInstruction>,
}

#[derive(Debug, Deserialize)]
struct ParsedAccountKey {
    pubkey: String,
    #[serde(default)]
    signer: bool,
    #[serde(default)]
    writable: bool,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedInstruction {
    program_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedMeta {
    err: Option<Value>,
    #[serde(default)]
    fee: u64,
    #[serde(default)]
    pre_balances: Vec<u64>,
    #[serde(default)]
    post_balances: Vec<u64>,
    #[serde(default)]
    pre_token_balances: Vec<EncodedTokenBalance>,
    #[serde(default)]
    post_token_balances: Vec<EncodedTokenBalance>,
    log_messages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedTokenBalance {
    account_index: usize,
    mint: String,
    owner: Option<String>,
    ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiTokenAmount {
    amount: String, // raw integer units
    decimals: u32,
    ui_amount_string: Option<String>,
}

/// A fetched transaction reduced to what the explorer page needs
#[derive(Debug, Clone)]
pub struct TransactionDetails {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub fee: u64,
    pub account_keys: Vec<AccountKey>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalanceSnapshot>,
    pub post_token_balances: Vec<TokenBalanceSnapshot>,
    pub program_ids: HashSet<String>,
    pub log_messages: Vec<String>,
    pub error_reason: Option<String>,
}

impl TransactionDetails {
    pub fn overview(&self) -> TransactionOverview {
        TransactionOverview {
            signature: self.signature.clone(),
            slot: self.slot,
            block_time: self.block_time.map(|t| t.to_rfc3339()),
            fee: self.fee,
            success: self.error_reason.is_none(),
            error_reason: self.error_reason.clone(),
        }
    }
}

/// Signatures are base58 encodings of 64 bytes
pub fn validate_signature(signature: &str) -> Result<()> {
    let bytes = bs58::decode(signature)
        .into_vec()
        .map_err(|e| ExplainError::InvalidSignature(format!("{signature}: {e}")))?;
    if bytes.len() != 64 {
        return Err(ExplainError::InvalidSignature(format!(
            "{signature}: expected 64 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

/// Scale a raw token amount by its mint decimals without going through floats
fn token_amount(ui: &UiTokenAmount) -> Option<Decimal> {
    let raw: i128 = ui.amount.parse().ok()?;
    Decimal::try_from_i128_with_scale(raw, ui.decimals)
        .ok()
        .or_else(|| ui.ui_amount_string.as_deref()?.parse().ok())
}

fn decode_token_balances(encoded: Vec<EncodedTokenBalance>) -> Result<Vec<TokenBalanceSnapshot>> {
    encoded
        .into_iter()
        .map(|b| {
            let amount = token_amount(&b.ui_token_amount).ok_or_else(|| {
                ExplainError::MalformedTransactionMeta(format!(
                    "unreadable token amount {:?} at account index {}",
                    b.ui_token_amount.amount, b.account_index
                ))
            })?;
            Ok(TokenBalanceSnapshot {
                account_index: b.account_index,
                mint: b.mint,
                amount,
                owner: b.owner,
            })
        })
        .collect()
}

/// Human-readable failure reason for a transaction `err` value
pub fn error_reason(err: &Value, account_keys: &[AccountKey]) -> Option<String> {
    if err.is_null() {
        return None;
    }

    if let Some(idx) = err
        .get("InstructionError")
        .and_then(|ie| ie.get(0))
        .and_then(Value::as_u64)
    {
        return Some(format!("Program Error: \"Instruction #{} Failed\"", idx + 1));
    }

    if let Some(i) = err
        .get("InsufficientFundsForRent")
        .and_then(|v| v.get("account_index"))
        .and_then(Value::as_u64)
    {
        let account = account_keys
            .get(i as usize)
            .map(|k| k.address.clone())
            .unwrap_or_else(|| format!("account #{}", i));
        return Some(format!("Insufficient funds for rent: {}", account));
    }

    match err {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Decode a `getTransaction` (jsonParsed) result
pub fn decode_transaction(raw: Value) -> Result<TransactionDetails> {
    let tx: EncodedTransaction = serde_json::from_value(raw)?;

    let meta = tx
        .meta
        .ok_or_else(|| ExplainError::MalformedTransactionMeta("transaction meta is missing".into()))?;

    let account_keys: Vec<AccountKey> = tx
        .transaction
        .message
        .account_keys
        .into_iter()
        .map(|k| AccountKey {
            address: k.pubkey,
            is_signer: k.signer,
            is_writable: k.writable,
            source: match k.source.as_deref() {
                Some("lookupTable") => KeySource::LookupTable,
                _ => KeySource::Transaction,
            },
        })
        .collect();

    let program_ids = tx
        .transaction
        .message
        .instructions
        .into_iter()
        .map(|ix| ix.program_id)
        .collect();

    let error_reason = meta.err.as_ref().and_then(|e| error_reason(e, &account_keys));

    Ok(TransactionDetails {
        signature: tx.transaction.signatures.into_iter().next().unwrap_or_default(),
        slot: tx.slot,
        block_time: tx.block_time.and_then(|t| DateTime::from_timestamp(t, 0)),
        fee: meta.fee,
        account_keys,
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
        pre_token_balances: decode_token_balances(meta.pre_token_balances)?,
        post_token_balances: decode_token_balances(meta.post_token_balances)?,
        program_ids,
        log_messages: meta.log_messages.unwrap_or_default(),
        error_reason,
    })
}

/// `getTransaction` result shared by tests across modules
#[cfg(test)]
pub(crate) fn sample_transaction() -> Value {
    serde_json::json!({
        "slot": 250000000,
        "blockTime": 1700000000,
        "transaction": {
            "signatures": ["5j7s6NiJS3JAkvgkoc18WVAsiSaci2pxB2A6ueCJP4tprA2TFg9wSyTLeYouxPBJEMzJinENTkpA52YStRW5Dia7"],
            "message": {
                "accountKeys": [
                    { "pubkey": "Payer111", "signer": true, "writable": true, "source": "transaction" },
                    { "pubkey": "TokenAcct111", "signer": false, "writable": true, "source": "lookupTable" },
                    { "pubkey": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA", "signer": false, "writable": false, "source": "transaction" }
                ],
                "instructions": [
                    { "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA", "accounts": [], "data": "3Bxs" }
                ]
            }
        },
        "meta": {
            "err": null,
            "fee": 5000,
            "preBalances": [1000000, 2039280, 934087680],
            "postBalances": [995000, 2039280, 934087680],
            "preTokenBalances": [{
                "accountIndex": 1,
                "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "owner": "Payer111",
                "uiTokenAmount": { "amount": "1500000", "decimals": 6, "uiAmount": 1.5, "uiAmountString": "1.5" }
            }],
            "postTokenBalances": [{
                "accountIndex": 1,
                "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "owner": "Payer111",
                "uiTokenAmount": { "amount": "500000", "decimals": 6, "uiAmount": 0.5, "uiAmountString": "0.5" }
            }],
            "logMessages": ["Program TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA invoke [1]"]
        }
    })
}
