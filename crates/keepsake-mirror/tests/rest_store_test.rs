//! HTTP behavior of the REST remote store against a mock backend.

use std::sync::Arc;
use std::time::Duration;

use keepsake_core::{Bookmark, Error, RecordKind, RemoteStore, StaticSession, SyncableRecord};
use keepsake_crypto::{FieldCipher, KeyManager, KeyManagerConfig, MemoryKeyStore};
use keepsake_mirror::{MirrorClient, RestConfig, RestRemoteStore, UpsertOutcome};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> RestRemoteStore {
    let session = StaticSession::signed_in("user-1");
    session.set_access_token("user-jwt");
    let config = RestConfig::default()
        .with_base_url(server.uri())
        .with_api_key("anon-key")
        .with_timeout_seconds(2);
    RestRemoteStore::new(config, Arc::new(session)).expect("Failed to create store")
}

fn cipher() -> FieldCipher {
    let keys = KeyManager::new(Arc::new(MemoryKeyStore::new()), KeyManagerConfig::default());
    FieldCipher::new(Arc::new(keys))
}

#[tokio::test]
async fn test_list_client_ids_sends_filters_and_headers() {
    let server = MockServer::start().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .and(query_param("select", "client_id"))
        .and(query_param("owner_id", "eq.user-1"))
        .and(header("apikey", "anon-key"))
        .and(header("Authorization", "Bearer user-jwt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "client_id": a }, { "client_id": b }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let ids = store.list_client_ids("bookmarks", "user-1").await.unwrap();
    assert_eq!(ids, vec![a, b]);
}

#[tokio::test]
async fn test_upsert_inserts_when_row_absent() {
    let server = MockServer::start().await;
    let bookmark = Bookmark::new("Secret title", "https://a.example");

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .and(query_param("client_id", format!("eq.{}", bookmark.client_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookmarks"))
        .and(header("Prefer", "return=minimal"))
        .and(body_partial_json(json!({
            "owner_id": "user-1",
            "client_id": bookmark.client_id,
            "is_encrypted": true,
            "sync_version": 1
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = MirrorClient::new(Arc::new(store_for(&server)), cipher());
    let outcome = client.upsert(&bookmark.snapshot(), "user-1").await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);

    // Plaintext title never reaches the wire
    let requests = server.received_requests().await.unwrap();
    let post = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();
    let body = String::from_utf8_lossy(&post.body);
    assert!(!body.contains("Secret title"));
}

#[tokio::test]
async fn test_upsert_updates_existing_row_by_remote_id() {
    let server = MockServer::start().await;
    let bookmark = Bookmark::new("A", "https://a.example");

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "row-42",
            "owner_id": "user-1",
            "client_id": bookmark.client_id,
            "is_encrypted": true,
            "sync_version": 4,
            "title": "old-ciphertext"
        }])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookmarks"))
        .and(query_param("id", "eq.row-42"))
        .and(body_partial_json(json!({ "sync_version": 5 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = MirrorClient::new(Arc::new(store_for(&server)), cipher());
    let outcome = client.upsert(&bookmark.snapshot(), "user-1").await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);
}

#[tokio::test]
async fn test_delete_counts_removed_rows() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/categories"))
        .and(query_param("client_id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "row-1" }])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert_eq!(store.delete_rows("categories", "user-1", id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unauthorized_maps_to_not_authenticated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let result = store.list_client_ids("bookmarks", "user-1").await;
    assert!(matches!(result, Err(Error::NotAuthenticated)));
}

#[tokio::test]
async fn test_bad_request_maps_to_remote_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string("column \"colour\" does not exist"),
        )
        .mount(&server)
        .await;

    let row = keepsake_mirror::build_row(
        &cipher(),
        &Bookmark::new("A", "https://a.example").snapshot(),
        "user-1",
        1,
    )
    .unwrap();

    let store = store_for(&server);
    match store.insert_row("bookmarks", &row).await {
        Err(Error::RemoteRejected(reason)) => assert!(reason.contains("colour")),
        other => panic!("expected RemoteRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_backend_times_out_as_network_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let result = store.find_row("bookmarks", "user-1", Uuid::new_v4()).await;
    match result {
        Err(err) => assert!(err.is_retryable(), "expected network error, got {:?}", err),
        Ok(_) => panic!("expected timeout"),
    }
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let config = RestConfig::default()
        .with_base_url("http://127.0.0.1:1")
        .with_timeout_seconds(2);
    let store = RestRemoteStore::new(config, Arc::new(StaticSession::signed_in("user-1"))).unwrap();

    let result = store.list_client_ids("bookmarks", "user-1").await;
    assert!(matches!(result, Err(Error::Network(_))));
}

#[tokio::test]
async fn test_fetch_decrypted_reads_back_plaintext() {
    let server = MockServer::start().await;
    let cipher = cipher();
    let bookmark = Bookmark::new("Readable", "https://a.example");
    let mut row = keepsake_mirror::build_row(&cipher, &bookmark.snapshot(), "user-1", 1).unwrap();
    row.remote_id = Some("row-7".into());

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&server)
        .await;

    let client = MirrorClient::new(Arc::new(store_for(&server)), cipher);
    let fields = client
        .fetch_decrypted(RecordKind::Bookmark, bookmark.client_id, "user-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fields["title"], json!("Readable"));
}
