// src/balances.rs
use futures_util::future::join_all;
use std::collections::HashSet;

use crate::error::{ExplainError, Result};
use crate::labels::AddressLabeler;
use crate::models::{AccountKey, BalanceDeltaRecord, KeySource, RoleFlag};

fn role_flags(index: usize, key: &AccountKey, program_ids: &HashSet<String>) -> Vec<RoleFlag> {
    let mut flags = Vec::new();
    if index == 0 {
        flags.push(RoleFlag::FeePayer);
    }
    if key.is_signer {
        flags.push(RoleFlag::Signer);
    }
    if key.is_writable {
        flags.push(RoleFlag::Writable);
    }
    if key.source == KeySource::LookupTable {
        flags.push(RoleFlag::LookupTable);
    }
    if program_ids.contains(&key.address) {
        flags.push(RoleFlag::Program);
    }
    flags
}

/// Exact `post - pre` in lamports
fn lamport_delta(index: usize, pre: u64, post: u64) -> Result<i64> {
    i64::try_from(i128::from(post) - i128::from(pre)).map_err(|_| {
        ExplainError::MalformedTransactionMeta(format!(
            "lamport delta out of range at account {index}: {pre} -> {post}"
        ))
    })
}

/// One record per account key, in account order
pub async fn compute(
    account_keys: &[AccountKey],
    pre_balances: &[u64],
    post_balances: &[u64],
    program_ids: &HashSet<String>,
    labeler: &dyn AddressLabeler,
) -> Result<Vec<BalanceDeltaRecord>> {
    if account_keys.len() != pre_balances.len() || account_keys.len() != post_balances.len() {
        return Err(ExplainError::MalformedTransactionMeta(format!(
            "{} account keys but {} pre and {} post balances",
            account_keys.len(),
            pre_balances.len(),
            post_balances.len()
        )));
    }

    let names = join_all(account_keys.iter().map(|k| labeler.display_name(&k.address))).await;

    account_keys
        .iter()
        .zip(pre_balances.iter().zip(post_balances))
        .zip(names)
        .enumerate()
        .map(|(i, ((key, (&pre, &post)), display_name))| {
            Ok(BalanceDeltaRecord {
                account_index: i,
                address: key.address.clone(),
                pre_lamports: pre,
                post_lamports: post,
                delta: lamport_delta(i, pre, post)?,
                display_name,
                role_flags: role_flags(i, key, program_ids),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::fakes::StaticLabeler;

    fn programs(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn transfer_between_two_accounts() {
        let keys = vec![AccountKey::new("A", true, true), AccountKey::new("B", false, false)];
        let labeler = StaticLabeler::with(&[("A", "Alice")]);

        let deltas = compute(&keys, &[1000, 500], &[995, 505], &programs(&[]), &labeler)
            .await
            .unwrap();

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].address, "A");
        assert_eq!(deltas[0].display_name, "Alice");
        assert_eq!(deltas[0].delta, -5);
        assert_eq!(
            deltas[0].role_flags,
            vec![RoleFlag::FeePayer, RoleFlag::Signer, RoleFlag::Writable]
        );
        assert_eq!(deltas[1].display_name, "B");
        assert_eq!(deltas[1].delta, 5);
        assert!(deltas[1].role_flags.is_empty());
        assert_eq!(deltas.iter().map(|d| d.delta).sum::<i64>(), 0);
    }

    #[tokio::test]
    async fn length_mismatch_is_malformed() {
        let keys = vec![AccountKey::new("A", true, true)];
        let err = compute(&keys, &[1, 2], &[1], &programs(&[]), &StaticLabeler::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExplainError::MalformedTransactionMeta(_)));
    }

    #[tokio::test]
    async fn program_and_lookup_flags_match_by_address() {
        let keys = vec![
            AccountKey::new("Payer", true, true),
            AccountKey::new("Table", false, true).from_lookup_table(),
            AccountKey::new("Prog", false, false),
        ];

        let deltas = compute(
            &keys,
            &[10, 20, 30],
            &[10, 20, 30],
            &programs(&["Prog", "NotInAccounts"]),
            &StaticLabeler::default(),
        )
        .await
        .unwrap();

        assert_eq!(deltas[1].role_flags, vec![RoleFlag::Writable, RoleFlag::LookupTable]);
        assert_eq!(deltas[2].role_flags, vec![RoleFlag::Program]);
        assert!(deltas.iter().all(|d| d.delta == 0));
        assert_eq!(
            deltas.iter().map(|d| d.account_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn extreme_balances_stay_exact() {
        let keys = vec![AccountKey::new("A", true, true), AccountKey::new("B", false, true)];
        let deltas = compute(
            &keys,
            &[u64::MAX, 0],
            &[u64::MAX - 5, i64::MAX as u64],
            &programs(&[]),
            &StaticLabeler::default(),
        )
        .await
        .unwrap();

        assert_eq!(deltas[0].delta, -5);
        assert_eq!(deltas[1].delta, i64::MAX);

        let err = compute(&keys[..1], &[0], &[u64::MAX], &programs(&[]), &StaticLabeler::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExplainError::MalformedTransactionMeta(_)));
    }

    #[tokio::test]
    async fn empty_account_list_yields_no_records() {
        let deltas = compute(&[], &[], &[], &programs(&[]), &StaticLabeler::default())
            .await
            .unwrap();
        assert!(deltas.is_empty());
    }
}
