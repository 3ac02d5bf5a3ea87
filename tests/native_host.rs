//! JSON protocol over native-messaging frames

use bapvault::api::{read_frame, serve, write_frame, RequestHandler};
use bapvault::broker::{RequestBroker, SystemClock, TransferSettings, WalletService};
use bapvault::crypto::{KdfParams, DEFAULT_DERIVATION_PATH};
use bapvault::keystore::{KeyVault, KeyVaultOptions, MemoryVaultStorage};
use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, DuplexStream};

const MAX: usize = 64 * 1024;

fn handler() -> RequestHandler {
    let vault = Arc::new(KeyVault::new(
        Arc::new(MemoryVaultStorage::new()),
        KeyVaultOptions {
            profile_id: "default".to_string(),
            kdf_params: KdfParams::argon2id(256, 1, 1),
            derivation_path: DEFAULT_DERIVATION_PATH.to_string(),
            session_ttl: Duration::seconds(900),
            enable_mlock: false,
        },
    ));
    let service = Arc::new(WalletService::new(
        vault,
        1,
        TransferSettings {
            default_token: "BAP".to_string(),
            fee_rate_ppm: 1000,
        },
    ));
    let (broker, _task) = RequestBroker::spawn(service, Arc::new(SystemClock), 16);
    RequestHandler::new(broker)
}

/// Start a host on one end of a duplex pipe and return the other end
fn spawn_host() -> DuplexStream {
    let (client, server) = tokio::io::duplex(256 * 1024);
    tokio::spawn(async move {
        let handler = handler();
        let (reader, writer) = tokio::io::split(server);
        let _ = serve(&handler, reader, writer, MAX).await;
    });
    client
}

async fn call(client: &mut DuplexStream, request: Value) -> Value {
    write_frame(client, &serde_json::to_vec(&request).unwrap())
        .await
        .unwrap();
    let frame = read_frame(client, 4 * MAX).await.unwrap().unwrap();
    serde_json::from_slice(&frame).unwrap()
}

#[tokio::test]
async fn test_wallet_session_over_frames() {
    let mut client = spawn_host();

    let status = call(&mut client, json!({"type": "BAP_STATUS", "id": "s1"})).await;
    assert_eq!(status["type"], "BAP_STATUS_RESPONSE");
    assert_eq!(status["id"], "s1");
    assert_eq!(status["success"], true);
    assert_eq!(status["hasWallet"], false);
    assert_eq!(status["state"], "locked");
    assert_eq!(status["storageAvailable"], true);
    assert_eq!(status["storage"]["itemCount"], 0);

    let locked = call(&mut client, json!({"type": "BAP_CONNECT_REQUEST", "id": 1})).await;
    assert_eq!(locked["type"], "BAP_CONNECT_RESPONSE");
    assert_eq!(locked["success"], false);
    assert_eq!(locked["error"]["code"], "LOCKED");
    assert_eq!(locked["error"]["requiresUnlock"], true);

    let created = call(
        &mut client,
        json!({"type": "BAP_CREATE_WALLET", "password": "Sup3r$ecret!", "wordCount": 12}),
    )
    .await;
    assert_eq!(created["success"], true);
    assert_eq!(created["passwordStrength"], "strong");
    let address = created["address"].as_str().unwrap().to_string();
    assert_eq!(created["mnemonic"].as_str().unwrap().split(' ').count(), 12);

    let wrong = call(&mut client, json!({"type": "BAP_UNLOCK", "password": "Wr0ng$ecret!"})).await;
    assert_eq!(wrong["success"], false);
    assert_eq!(wrong["error"]["code"], "INVALID_PASSWORD");
    assert_eq!(wrong["error"]["failedAttempts"], 1);

    let unlocked = call(&mut client, json!({"type": "BAP_UNLOCK", "password": "Sup3r$ecret!"})).await;
    assert_eq!(unlocked["success"], true);
    assert_eq!(unlocked["address"], address.as_str());

    let account = call(&mut client, json!({"type": "BAP_GET_ACCOUNT"})).await;
    assert_eq!(account["type"], "BAP_ACCOUNT_RESPONSE");
    assert_eq!(account["address"], address.as_str());

    let sent = call(
        &mut client,
        json!({
            "type": "BAP_SEND_TRANSACTION",
            "id": 42,
            "to": "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23",
            "amount": "1.5",
            "token": "BAP"
        }),
    )
    .await;
    assert_eq!(sent["type"], "BAP_TRANSACTION_RESPONSE");
    assert_eq!(sent["id"], 42);
    assert_eq!(sent["success"], true);
    assert!(sent["txHash"].as_str().unwrap().starts_with("0x"));
    assert!(sent["rawTransaction"].as_str().unwrap().starts_with("0x"));

    let signed = call(&mut client, json!({"type": "BAP_SIGN_MESSAGE", "message": "hello"})).await;
    assert_eq!(signed["type"], "BAP_SIGN_RESPONSE");
    // 0x + 65 bytes
    assert_eq!(signed["signature"].as_str().unwrap().len(), 132);

    let history = call(&mut client, json!({"type": "GET_TRANSACTION_HISTORY"})).await;
    assert_eq!(history["type"], "TRANSACTION_HISTORY_RESPONSE");
    assert_eq!(history["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(history["transactions"][0]["txHash"], sent["txHash"]);

    let lock = call(&mut client, json!({"type": "BAP_LOCK"})).await;
    assert_eq!(lock["success"], true);
    let after = call(&mut client, json!({"type": "BAP_SIGN_MESSAGE", "message": "hello"})).await;
    assert_eq!(after["error"]["code"], "LOCKED");
}

#[tokio::test]
async fn test_bad_input_gets_error_response() {
    let mut client = spawn_host();

    write_frame(&mut client, b"not json").await.unwrap();
    let frame = read_frame(&mut client, MAX).await.unwrap().unwrap();
    let reply: Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(reply["type"], "BAP_ERROR");
    assert_eq!(reply["error"]["code"], "INVALID_REQUEST");

    let unknown = call(&mut client, json!({"type": "BAP_TELEPORT", "id": 9})).await;
    assert_eq!(unknown["type"], "BAP_ERROR");
    assert_eq!(unknown["id"], 9);

    let weak = call(&mut client, json!({"type": "BAP_CREATE_WALLET", "password": "short"})).await;
    assert_eq!(weak["type"], "BAP_CREATE_WALLET_RESPONSE");
    assert_eq!(weak["error"]["code"], "WEAK_PASSWORD");

    // The host keeps serving after errors
    let status = call(&mut client, json!({"type": "BAP_STATUS"})).await;
    assert_eq!(status["success"], true);
}

#[tokio::test]
async fn test_oversized_frame_closes_host() {
    let mut client = spawn_host();

    client.write_all(&((MAX as u32) + 1).to_le_bytes()).await.unwrap();
    let frame = read_frame(&mut client, MAX).await.unwrap().unwrap();
    let reply: Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(reply["error"]["code"], "INVALID_REQUEST");

    // Host is gone; the stream ends
    assert!(read_frame(&mut client, MAX).await.unwrap().is_none());
}
