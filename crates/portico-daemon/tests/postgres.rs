//! PostgreSQL backend tests for the conditional updates
//!
//! These run only when `PORTICO_TEST_DATABASE_URL` points at a scratch database;
//! otherwise each test returns immediately. Every test works on freshly
//! generated ids, so runs against a shared database do not interfere.

use chrono::{Duration, Utc};
use portico_daemon::storage::{
    AccountStorage, AllowlistStorage, AuthStorage, ClientStorage, ContractStorage, FormStorage,
};
use portico_daemon::PostgresStorage;
use portico_types::{
    Account, AllowlistEntry, Client, ClientSessionRecord, Contract, ContractStatus, Form,
    FormField, FormStatus, FormSubmission, MagicLinkRecord,
};
use serde_json::json;

async fn storage() -> Option<PostgresStorage> {
    let url = std::env::var("PORTICO_TEST_DATABASE_URL").ok()?;
    Some(
        PostgresStorage::new(&url, 4, 10)
            .await
            .expect("connect to PORTICO_TEST_DATABASE_URL"),
    )
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_link_allowlist_client_only_fills_empty() {
    let Some(storage) = storage().await else {
        return;
    };
    let account = Account::new(unique("Linkers"));
    storage.upsert_account(account.clone()).await.unwrap();
    let first = Client::new(account.id, "Ada", "Lovelace", "ada@example.com");
    let second = Client::new(account.id, "Ada", "Byron", "ada@example.com");
    storage.upsert_client(first.clone()).await.unwrap();
    storage.upsert_client(second.clone()).await.unwrap();

    let entry = AllowlistEntry::new(account.id, "ada@example.com");
    storage.insert_allowlist_entry(entry.clone()).await.unwrap();

    let linked = storage.link_allowlist_client(&entry.id, &first.id).await.unwrap();
    assert_eq!(linked, Some(first.id));

    let linked = storage.link_allowlist_client(&entry.id, &second.id).await.unwrap();
    assert_eq!(linked, Some(first.id));

    let stored = storage.get_allowlist_entry(&entry.id).await.unwrap().unwrap();
    assert_eq!(stored.client_id, Some(first.id));
    assert_eq!(storage.list_allowlist(&account.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_magic_link_consumed_once() {
    let Some(storage) = storage().await else {
        return;
    };
    let now = Utc::now();
    let token_hash = unique("link");
    storage
        .insert_magic_link(MagicLinkRecord {
            token_hash: token_hash.clone(),
            email: "ada@example.com".to_string(),
            company_slug: "acme-studio".to_string(),
            client_slug: "ada-lovelace".to_string(),
            expires_at: now + Duration::hours(1),
            used_at: None,
            created_at: now,
        })
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        storage.consume_magic_link(&token_hash, now),
        storage.consume_magic_link(&token_hash, now),
    );
    let wins = [first.unwrap(), second.unwrap()];
    assert_eq!(wins.iter().filter(|won| **won).count(), 1);

    let stored = storage.get_magic_link(&token_hash).await.unwrap().unwrap();
    assert!(stored.used_at.is_some());
    assert!(!storage.consume_magic_link(&token_hash, now).await.unwrap());
}

#[tokio::test]
async fn test_contract_update_checks_version() {
    let Some(storage) = storage().await else {
        return;
    };
    let account = Account::new(unique("Versions"));
    let mut contract = Contract::new(account.id, "Retainer");
    contract.status = ContractStatus::Sent;
    storage.upsert_contract(contract.clone()).await.unwrap();

    let read = storage.get_contract(&contract.id).await.unwrap().unwrap();
    let mut winner = read.clone();
    winner.name = "Winner".to_string();
    let mut loser = read.clone();
    loser.name = "Loser".to_string();

    assert!(storage.update_contract(winner).await.unwrap());
    assert!(!storage.update_contract(loser).await.unwrap());

    let stored = storage.get_contract(&contract.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Winner");
    assert_eq!(stored.version, read.version + 1);
}

#[tokio::test]
async fn test_purge_expired_rows() {
    let Some(storage) = storage().await else {
        return;
    };
    let now = Utc::now();
    let link = |hash: &str, expires_in: Duration| MagicLinkRecord {
        token_hash: hash.to_string(),
        email: "ada@example.com".to_string(),
        company_slug: "acme-studio".to_string(),
        client_slug: "ada-lovelace".to_string(),
        expires_at: now + expires_in,
        used_at: None,
        created_at: now - Duration::hours(2),
    };
    let stale_link = unique("stale");
    let live_link = unique("live");
    storage
        .insert_magic_link(link(&stale_link, -Duration::minutes(1)))
        .await
        .unwrap();
    storage
        .insert_magic_link(link(&live_link, Duration::hours(1)))
        .await
        .unwrap();

    let session = |hash: &str, refresh_expires_in: Duration| ClientSessionRecord {
        session_hash: hash.to_string(),
        refresh_hash: format!("{}-refresh", hash),
        account_id: portico_types::AccountId::generate(),
        email: "ada@example.com".to_string(),
        company_slug: "acme-studio".to_string(),
        client_slug: "ada-lovelace".to_string(),
        expires_at: now - Duration::minutes(5),
        refresh_expires_at: now + refresh_expires_in,
        created_at: now - Duration::hours(2),
    };
    let dead_session = unique("dead");
    let refreshable_session = unique("refreshable");
    storage
        .insert_session(session(&dead_session, -Duration::minutes(1)))
        .await
        .unwrap();
    storage
        .insert_session(session(&refreshable_session, Duration::days(1)))
        .await
        .unwrap();

    let purged = storage.purge_expired(now).await.unwrap();
    assert!(purged.magic_links >= 1);
    assert!(purged.sessions >= 1);

    assert!(storage.get_magic_link(&stale_link).await.unwrap().is_none());
    assert!(storage.get_magic_link(&live_link).await.unwrap().is_some());
    assert!(storage.get_session(&dead_session).await.unwrap().is_none());
    assert!(storage.get_session(&refreshable_session).await.unwrap().is_some());
}

#[tokio::test]
async fn test_form_submission_cap() {
    let Some(storage) = storage().await else {
        return;
    };
    let account = Account::new(unique("Forms"));
    let mut form = Form::new(
        account.id,
        "Brief",
        vec![FormField {
            id: "goal".to_string(),
            field_type: "text".to_string(),
            label: "Goal".to_string(),
            description: None,
            required: true,
            options: None,
        }],
    );
    form.set_status(FormStatus::Published, Utc::now());
    form.max_submissions = Some(2);
    storage.upsert_form(form.clone()).await.unwrap();

    let submission = || {
        FormSubmission::build(
            &form,
            json!({ "goal": "Launch" }).as_object().cloned().unwrap(),
            None,
            None,
            Utc::now(),
        )
        .unwrap()
    };

    let (a, b, c) = tokio::join!(
        storage.record_form_submission(submission(), form.max_submissions),
        storage.record_form_submission(submission(), form.max_submissions),
        storage.record_form_submission(submission(), form.max_submissions),
    );
    let mut numbers: Vec<u32> = [a.unwrap(), b.unwrap(), c.unwrap()]
        .into_iter()
        .flatten()
        .map(|s| s.submission_number)
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);

    let stored = storage.get_form(&form.id).await.unwrap().unwrap();
    assert_eq!(stored.total_submissions, 2);
    assert_eq!(storage.list_form_submissions(&form.id).await.unwrap().len(), 2);
}
