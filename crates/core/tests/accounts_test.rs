//! Account registration and lifecycle against the in-memory CA

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{harness, register_account, test_config, MockConnector, StaticResolver};
use easyacme::service::AccountFilter;
use easyacme::{
    AccountId, AccountStatus, ErrorKind, JsonFileStore, KeyType, PageRequest, PrivateKey,
    RegisterAccount, Services, Store,
};

fn request(name: &str, key_type: &str) -> RegisterAccount {
    RegisterAccount {
        name: name.to_string(),
        email: "ops@example.com".to_string(),
        key_type: key_type.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_register_stores_key_of_requested_type() {
    let h = harness();

    for (wire, expected) in [
        ("P256", KeyType::P256),
        ("P384", KeyType::P384),
        ("2048", KeyType::Rsa2048),
    ] {
        let view = h
            .services
            .accounts
            .register(request(&format!("acct-{}", wire), wire))
            .await
            .unwrap();
        assert_eq!(view.key_type, expected);
        assert_eq!(view.status, AccountStatus::Valid);
        assert_eq!(view.registration_uri.as_deref(), Some("https://ca.test/acct/1"));

        let stored = h.store.account(&view.id).unwrap().unwrap();
        let key = PrivateKey::from_pem(&stored.private_key).unwrap();
        assert_eq!(key.key_type(), expected);
    }
}

#[tokio::test]
async fn test_register_rejects_unknown_key_type() {
    let h = harness();

    let err = h
        .services
        .accounts
        .register(request("bad", "P521"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h.store.accounts().unwrap().is_empty());
    assert_eq!(h.engine().register_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_register_rejects_one_sided_eab() {
    let h = harness();

    let mut req = request("eab", "P256");
    req.eab_key_id = Some("kid-1".to_string());
    let err = h.services.accounts.register(req).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h.store.accounts().unwrap().is_empty());
}

#[tokio::test]
async fn test_register_with_eab() {
    let h = harness();

    let mut req = request("eab", "P256");
    req.eab_key_id = Some("kid-1".to_string());
    req.eab_hmac_key = Some("c2VjcmV0LWhtYWMta2V5".to_string());
    let view = h.services.accounts.register(req).await.unwrap();

    assert_eq!(view.eab_key_id.as_deref(), Some("kid-1"));
    assert_eq!(*h.engine().eab_key_ids.lock(), vec!["kid-1".to_string()]);
    let stored = h.store.account(&view.id).unwrap().unwrap();
    assert!(stored.has_eab());
}

#[tokio::test]
async fn test_deactivate_then_conflict() {
    let h = harness();
    let account = register_account(&h, "primary").await;

    h.services.accounts.deactivate(&account.id).await.unwrap();
    let view = h.services.accounts.get(&account.id).unwrap();
    assert_eq!(view.status, AccountStatus::Deactivated);

    let err = h.services.accounts.deactivate(&account.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.engine().deactivate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_deactivate_failure_keeps_status() {
    let h = harness();
    let account = register_account(&h, "primary").await;
    h.engine().fail_deactivate.store(true, Ordering::SeqCst);

    let err = h.services.accounts.deactivate(&account.id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    let view = h.services.accounts.get(&account.id).unwrap();
    assert_eq!(view.status, AccountStatus::Valid);
}

#[tokio::test]
async fn test_unknown_account_is_not_found() {
    let h = harness();
    let missing = AccountId::new("missing");

    let err = h.services.accounts.deactivate(&missing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h.services.accounts.delete(&missing).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_list_filters_and_stats() {
    let h = harness();
    let first = register_account(&h, "Staging").await;
    let _second = register_account(&h, "production").await;
    h.services.accounts.deactivate(&first.id).await.unwrap();

    let page = h
        .services
        .accounts
        .list(
            &AccountFilter {
                name: Some("STAG".to_string()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, first.id);

    let page = h
        .services
        .accounts
        .list(
            &AccountFilter {
                status: Some(AccountStatus::Valid),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].name, "production");

    let stats = h.services.accounts.stats().unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.valid, 1);
    assert_eq!(stats.deactivated, 1);
    assert_eq!(stats.revoked, 0);

    h.services.accounts.delete(&first.id).unwrap();
    assert_eq!(h.services.accounts.stats().unwrap().total, 1);
}

#[tokio::test]
async fn test_failed_state_write_leaves_no_account() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    let connector = Arc::new(MockConnector::default());
    let services = Services::assemble(
        &test_config(),
        store.clone() as Arc<dyn Store>,
        connector.clone(),
        Arc::new(StaticResolver::default()),
    )
    .unwrap();
    std::fs::create_dir(dir.path().join("state.json.tmp")).unwrap();

    let err = services
        .accounts
        .register(request("primary", "P256"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(connector.engine.register_calls.load(Ordering::SeqCst), 1);
    assert!(store.accounts().unwrap().is_empty());
    assert_eq!(services.accounts.stats().unwrap().total, 0);
}
