//! End-to-end vault behaviour against the in-memory store.

#![allow(clippy::unwrap_used)]

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Harness, TOKEN, ctx};
use envini_core::{MasterKey, VaultError, dotenv};

const SCENARIO_CONTENT: &[u8] = b"A=1\nB=\"two\"\n#comment\n";

fn as_map(content: &str) -> BTreeMap<String, String> {
    dotenv::parse(content.as_bytes())
        .unwrap()
        .iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

#[tokio::test]
async fn upload_tag_download_and_delete_walkthrough() {
    let h = Harness::new();
    h.github.grant(TOKEN, "acme", "widgets");

    // First upload.
    let first = h
        .vault
        .upload(&ctx(), TOKEN, "acme", "widgets", "development", SCENARIO_CONTENT)
        .await
        .unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(first.checksum, dotenv::checksum(SCENARIO_CONTENT));

    let downloaded = h
        .vault
        .download(&ctx(), TOKEN, "acme", "widgets", 1)
        .await
        .unwrap();
    let expected: BTreeMap<String, String> = [("A", "1"), ("B", "two")]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
    assert_eq!(as_map(&downloaded.content), expected);
    assert_eq!(downloaded.checksum, first.checksum);
    assert_eq!(downloaded.uploaded_by, "octocat");
    assert!(downloaded.is_encrypted);

    // Second upload under another tag takes the next global version.
    let second = h
        .vault
        .upload(&ctx(), TOKEN, "acme", "widgets", "production", b"A=2")
        .await
        .unwrap();
    assert_eq!(second.version, 2);

    // Tag resolution finds version 1.
    let by_tag = h
        .vault
        .download_by_tag(&ctx(), TOKEN, "acme", "widgets", "development")
        .await
        .unwrap();
    assert_eq!(by_tag.version, 1);
    assert_eq!(by_tag.content, downloaded.content);

    // Delete everything.
    let outcome = h
        .vault
        .delete(&ctx(), TOKEN, "acme", "widgets", 0)
        .await
        .unwrap();
    assert_eq!(outcome.deleted, -1);
    let versions = h
        .vault
        .list_versions(&ctx(), TOKEN, "acme", "widgets")
        .await
        .unwrap();
    assert!(versions.is_empty());
}

#[tokio::test]
async fn denied_upload_writes_nothing_but_one_audit_entry() {
    let h = Harness::new();
    h.github.grant(TOKEN, "acme", "other");

    let err = h
        .vault
        .upload(&ctx(), TOKEN, "acme", "widgets", "development", SCENARIO_CONTENT)
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::AccessDenied { .. }));
    assert_eq!(h.store.repository_count().await, 0);
    assert_eq!(h.store.secret_count().await, 0);

    let audit = h.store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].operation, "UPLOAD");
    assert!(!audit[0].success);
    assert_eq!(audit[0].actor, "octocat");
    assert_eq!(audit[0].service_name.as_deref(), Some("cli"));
}

#[tokio::test]
async fn every_operation_is_gated_by_the_live_listing() {
    let h = Harness::new();
    h.github.grant(TOKEN, "acme", "widgets");
    h.vault
        .upload(&ctx(), TOKEN, "acme", "widgets", "dev", b"A=1")
        .await
        .unwrap();

    // Revocation takes effect on the very next call.
    h.github.revoke_all(TOKEN);

    let denied = |r: Result<(), VaultError>| matches!(r, Err(VaultError::AccessDenied { .. }));
    assert!(denied(
        h.vault
            .download(&ctx(), TOKEN, "acme", "widgets", 1)
            .await
            .map(drop)
    ));
    assert!(denied(
        h.vault
            .download_by_tag(&ctx(), TOKEN, "acme", "widgets", "dev")
            .await
            .map(drop)
    ));
    assert!(denied(
        h.vault
            .delete(&ctx(), TOKEN, "acme", "widgets", 1)
            .await
            .map(drop)
    ));
    assert!(denied(
        h.vault
            .list_versions(&ctx(), TOKEN, "acme", "widgets")
            .await
            .map(drop)
    ));

    assert_eq!(h.store.secret_count().await, 1);
    let all = h
        .vault
        .list_all_repositories_with_versions(&ctx(), TOKEN)
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn different_master_key_is_a_crypto_failure() {
    let h = Harness::new();
    h.github.grant(TOKEN, "acme", "widgets");
    h.vault
        .upload(&ctx(), TOKEN, "acme", "widgets", "dev", SCENARIO_CONTENT)
        .await
        .unwrap();

    let other = Harness::with_key(h.store.clone(), h.github.clone(), MasterKey::generate());
    let err = other
        .vault
        .download(&ctx(), TOKEN, "acme", "widgets", 1)
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::Crypto(_)));
    assert_eq!(err.kind(), "crypto_failure");

    let same = Harness::with_key(h.store.clone(), h.github.clone(), h.master_key.clone());
    assert!(
        same.vault
            .download(&ctx(), TOKEN, "acme", "widgets", 1)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn sequential_uploads_number_one_to_n() {
    let h = Harness::new();
    h.github.grant(TOKEN, "acme", "widgets");

    for expected in 1..=10 {
        let tag = if expected % 2 == 0 { "even" } else { "odd" };
        let receipt = h
            .vault
            .upload(&ctx(), TOKEN, "acme", "widgets", tag, format!("N={expected}").as_bytes())
            .await
            .unwrap();
        assert_eq!(receipt.version, expected);
    }

    let latest_odd = h
        .vault
        .download_by_tag(&ctx(), TOKEN, "acme", "widgets", "odd")
        .await
        .unwrap();
    assert_eq!(latest_odd.version, 9);
    assert_eq!(latest_odd.content, "N=\"9\"");

    let missing = h
        .vault
        .download_by_tag(&ctx(), TOKEN, "acme", "widgets", "nope")
        .await
        .unwrap_err();
    assert!(matches!(missing, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn concurrent_uploads_get_distinct_contiguous_versions() {
    let h = Arc::new(Harness::new());
    h.github.grant(TOKEN, "acme", "widgets");

    let mut handles = Vec::new();
    for i in 0..24 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.vault
                .upload(&ctx(), TOKEN, "acme", "widgets", "dev", format!("I={i}").as_bytes())
                .await
                .unwrap()
                .version
        }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=24).collect::<Vec<_>>());
    assert_eq!(h.store.repository_count().await, 1);
}

#[tokio::test]
async fn versions_are_never_reissued_after_delete() {
    let h = Harness::new();
    h.github.grant(TOKEN, "acme", "widgets");
    for _ in 0..3 {
        h.vault
            .upload(&ctx(), TOKEN, "acme", "widgets", "dev", b"A=1")
            .await
            .unwrap();
    }

    let single = h
        .vault
        .delete(&ctx(), TOKEN, "acme", "widgets", 3)
        .await
        .unwrap();
    assert_eq!(single.deleted, 1);

    let remaining: Vec<i32> = h
        .vault
        .list_versions(&ctx(), TOKEN, "acme", "widgets")
        .await
        .unwrap()
        .iter()
        .map(|v| v.version)
        .collect();
    assert_eq!(remaining, vec![2, 1]);

    h.vault
        .delete(&ctx(), TOKEN, "acme", "widgets", 0)
        .await
        .unwrap();
    let next = h
        .vault
        .upload(&ctx(), TOKEN, "acme", "widgets", "dev", b"A=1")
        .await
        .unwrap();
    assert_eq!(next.version, 4);
}

#[tokio::test]
async fn every_call_is_audited_exactly_once() {
    let h = Harness::new();
    h.github.grant(TOKEN, "acme", "widgets");

    let c = ctx();
    let _ = h.vault.list_repos(&c, TOKEN).await;
    let _ = h.vault.upload(&c, TOKEN, "acme", "widgets", "dev", b"A=1").await;
    let _ = h.vault.upload(&c, TOKEN, "acme", "nope", "dev", b"A=1").await;
    let _ = h.vault.download(&c, TOKEN, "acme", "widgets", 0).await;
    let _ = h.vault.download(&c, TOKEN, "acme", "widgets", 42).await;
    let _ = h.vault.download_by_tag(&c, TOKEN, "acme", "widgets", "dev").await;
    let _ = h.vault.list_versions(&c, TOKEN, "acme", "widgets").await;
    let _ = h.vault.list_all_repositories_with_versions(&c, TOKEN).await;
    let _ = h.vault.delete(&c, TOKEN, "acme", "widgets", 7).await;
    let _ = h.vault.delete(&c, TOKEN, "acme", "widgets", 0).await;

    let audit = h.store.audit_entries().await;
    let ops: Vec<(&str, bool)> = audit
        .iter()
        .map(|e| (e.operation.as_str(), e.success))
        .collect();
    assert_eq!(
        ops,
        vec![
            ("LIST_REPOS", true),
            ("UPLOAD", true),
            ("UPLOAD", false),
            ("DOWNLOAD", true),
            ("DOWNLOAD", false),
            ("DOWNLOAD_BY_TAG", true),
            ("LIST_VERSIONS", true),
            ("LIST_ALL_REPOS", true),
            ("DELETE", false),
            ("DELETE", true),
        ]
    );
    assert!(audit.iter().all(|e| e.correlation_id == c.correlation_id));

    let download = &audit[3];
    assert!(download.repo_id.is_some());
    assert!(download.secret_id.is_some());
}
