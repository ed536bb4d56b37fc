//! End to end tests of the mediator
//!
//! Covers:
//! - Account access consent (request, approve, repeat)
//! - Authorization gating and bootstrap methods
//! - Signing consent with decoded instruction details
//! - Eviction of pending actions when a page disconnects
//! - Event suppression while the vault is locked
//! - Revoking authorization from either side
//! - Account, network and token management from the UI

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use wallet_core::error::{
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, UNAUTHORIZED, USER_REJECTED, WALLET_STATE,
};
use wallet_core::mediator::{
    Connection, Id, LogicalStream, Mediator, Outbound, Response, SenderInfo, StreamPeer,
};
use wallet_core::network::OfflineNetwork;
use wallet_core::transaction::{CompiledInstruction, Message, MessageHeader};
use wallet_core::types::TokenMeta;
use wallet_core::{Network, Origin, PublicKey, TabId, WalletConfig, WalletContext, telemetry};

const EXTENSION_ID: &str = "walletext";
const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const PASSWORD: &str = "correct horse";
const WAIT: Duration = Duration::from_secs(5);

fn setup() -> (Mediator, Arc<WalletContext>) {
    telemetry::init_test();
    let mut config = WalletConfig::default();
    config.extension.id = EXTENSION_ID.to_string();
    config.vault.kdf_iterations = 1_000;
    let ctx = WalletContext::new(config, Arc::new(OfflineNetwork)).unwrap();
    (Mediator::new(Arc::clone(&ctx)), ctx)
}

fn connect_ui(mediator: &Mediator) -> (Connection, StreamPeer) {
    let (stream, peer) = LogicalStream::pair(64);
    let sender = SenderInfo {
        extension_id: Some(EXTENSION_ID.to_string()),
        url: Some(format!("chrome-extension://{}/popup.html", EXTENSION_ID)),
        tab_id: None,
    };
    (mediator.connect(sender, stream).unwrap(), peer)
}

fn connect_page(mediator: &Mediator, url: &str, tab: i64) -> (Connection, StreamPeer) {
    let (stream, peer) = LogicalStream::pair(64);
    let sender = SenderInfo {
        extension_id: Some(EXTENSION_ID.to_string()),
        url: Some(url.to_string()),
        tab_id: Some(TabId(tab)),
    };
    (mediator.connect(sender, stream).unwrap(), peer)
}

async fn send(peer: &StreamPeer, id: i64, method: &str, params: Value) {
    peer.sender
        .send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
        .await
        .unwrap();
}

/// Next response on the stream, skipping events.
async fn next_response(peer: &mut StreamPeer) -> Response {
    loop {
        let outbound = timeout(WAIT, peer.receiver.recv())
            .await
            .expect("timed out waiting for a response")
            .expect("stream closed");
        if let Outbound::Response(response) = outbound {
            return response;
        }
    }
}

/// Params of the next `method` event on the stream, skipping anything else.
async fn next_event(peer: &mut StreamPeer, method: &str) -> Value {
    loop {
        let outbound = timeout(WAIT, peer.receiver.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {}", method))
            .expect("stream closed");
        if let Outbound::Notification(event) = outbound {
            if event.method == method {
                return event.params;
            }
        }
    }
}

/// Nothing at all arrives on the stream for a short while.
async fn assert_quiet(peer: &mut StreamPeer) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(peer.receiver.try_recv().is_err());
}

async fn call(peer: &mut StreamPeer, id: i64, method: &str, params: Value) -> Response {
    send(peer, id, method, params).await;
    let response = next_response(peer).await;
    assert_eq!(response.id, Some(Id::Num(id)));
    response
}

async fn call_ok(peer: &mut StreamPeer, id: i64, method: &str, params: Value) -> Value {
    let response = call(peer, id, method, params).await;
    match (response.result, response.error) {
        (Some(result), None) => result,
        (_, error) => panic!("{} failed: {:?}", method, error),
    }
}

fn error_code(response: &Response) -> i32 {
    response.error.as_ref().expect("expected an error").code
}

/// Poll until the action queue holds `count` actions.
async fn wait_for_actions(ctx: &WalletContext, count: usize) {
    timeout(WAIT, async {
        while ctx.actions.len() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("action queue never reached the expected size");
}

async fn create_vault(ui: &mut StreamPeer) -> Vec<PublicKey> {
    let created = call_ok(
        ui,
        100,
        "createVault",
        json!({ "mnemonic": MNEMONIC, "password": PASSWORD }),
    )
    .await;
    serde_json::from_value(created["accounts"].clone()).unwrap()
}

fn transfer_message(from: PublicKey, to: PublicKey, lamports: u64) -> Message {
    let mut data = 2u32.to_le_bytes().to_vec();
    data.extend_from_slice(&lamports.to_le_bytes());
    Message {
        header: MessageHeader {
            num_required_signatures: 1,
            num_readonly_signed_accounts: 0,
            num_readonly_unsigned_accounts: 1,
        },
        account_keys: vec![from, to, PublicKey::new([0; 32])],
        recent_blockhash: [7; 32],
        instructions: vec![CompiledInstruction {
            program_id_index: 2,
            accounts: vec![0, 1],
            data,
        }],
    }
}

#[tokio::test]
async fn request_accounts_waits_for_approval() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    let accounts = create_vault(&mut ui).await;
    assert_eq!(accounts.len(), 1);

    let (_page_conn, mut page) = connect_page(&mediator, "https://dapp.example/app", 7);
    send(&page, 1, "requestAccounts", Value::Null).await;
    wait_for_actions(&ctx, 1).await;

    let listed = call_ok(&mut ui, 2, "listActions", Value::Null).await;
    assert_eq!(listed[0]["kind"], "requestAccounts");
    assert_eq!(listed[0]["key"]["origin"], "https://dapp.example");
    assert_eq!(listed[0]["key"]["tabId"], 7);

    let approved = call_ok(
        &mut ui,
        3,
        "approveRequestAccounts",
        json!({ "actionKey": listed[0]["key"] }),
    )
    .await;
    assert_eq!(approved["accounts"], json!(accounts));

    let response = next_response(&mut page).await;
    assert_eq!(response.id, Some(Id::Num(1)));
    assert_eq!(response.result, Some(json!(accounts)));
    assert!(ctx.actions.is_empty());

    // Authorized now, so the answer comes straight back
    let again = call_ok(&mut page, 2, "requestAccounts", Value::Null).await;
    assert_eq!(again, json!(accounts));
    assert!(ctx.actions.is_empty());

    let origins = call_ok(&mut ui, 4, "listAuthorizedOrigins", Value::Null).await;
    assert_eq!(origins, json!(["https://dapp.example"]));
}

#[tokio::test]
async fn approval_answers_every_request_from_the_origin() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    let accounts = create_vault(&mut ui).await;

    let (_c1, mut tab_one) = connect_page(&mediator, "https://dapp.example/", 1);
    let (_c2, mut tab_two) = connect_page(&mediator, "https://dapp.example/other", 2);
    send(&tab_one, 1, "requestAccounts", Value::Null).await;
    send(&tab_two, 1, "requestAccounts", Value::Null).await;
    wait_for_actions(&ctx, 2).await;

    let key = ctx.actions.list()[0].key.clone();
    call_ok(&mut ui, 2, "approveRequestAccounts", json!({ "actionKey": key })).await;

    assert_eq!(next_response(&mut tab_one).await.result, Some(json!(accounts)));
    assert_eq!(next_response(&mut tab_two).await.result, Some(json!(accounts)));
    assert!(ctx.actions.is_empty());
}

#[tokio::test]
async fn declined_request_is_user_rejected() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;

    let (_page_conn, mut page) = connect_page(&mediator, "https://dapp.example", 3);
    send(&page, 9, "requestAccounts", Value::Null).await;
    wait_for_actions(&ctx, 1).await;

    let key = ctx.actions.list()[0].key.clone();
    call_ok(&mut ui, 2, "declineRequestAccounts", json!({ "actionKey": key })).await;

    let response = next_response(&mut page).await;
    assert_eq!(response.id, Some(Id::Num(9)));
    assert_eq!(error_code(&response), USER_REJECTED);

    // Settled actions cannot be settled twice
    let again = call(&mut ui, 3, "declineRequestAccounts", json!({ "actionKey": key })).await;
    assert!(again.error.is_some());
}

#[tokio::test]
async fn unauthorized_origin_is_gated() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;
    let (_page_conn, mut page) = connect_page(&mediator, "https://evil.example", 1);

    let response = call(&mut page, 1, "signTransaction", json!({ "message": "1111" })).await;
    assert_eq!(error_code(&response), UNAUTHORIZED);
    assert_eq!(
        response.error.unwrap().data,
        Some(json!({ "method": "signTransaction" }))
    );

    // Privileged methods are not reachable from a page, whatever it claims
    let response = call(
        &mut page,
        2,
        "approveRequestAccounts",
        json!({ "origin": "https://dapp.example" }),
    )
    .await;
    assert_eq!(error_code(&response), UNAUTHORIZED);

    // Bootstrap methods always pass
    let cluster = call_ok(&mut page, 3, "getCluster", Value::Null).await;
    assert_eq!(cluster["network"], "mainnet-beta");
    let state = call_ok(&mut page, 4, "getState", Value::Null).await;
    assert_eq!(state["state"], "unlocked");
    assert_eq!(state["connected"], false);

    // Once authorized, an unknown method is reported as such
    ctx.vault.authorize(Origin::from_url("https://evil.example").unwrap());
    let response = call(&mut page, 5, "createVault", Value::Null).await;
    assert_eq!(error_code(&response), METHOD_NOT_FOUND);
}

#[tokio::test]
async fn malformed_frames_get_invalid_request() {
    let (mediator, _ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);

    ui.sender.send(json!({ "id": 4, "params": [] })).await.unwrap();
    let response = next_response(&mut ui).await;
    assert_eq!(response.id, Some(Id::Num(4)));
    assert_eq!(error_code(&response), INVALID_REQUEST);

    // The connection keeps working afterwards
    let state = call_ok(&mut ui, 5, "getState", Value::Null).await;
    assert_eq!(state["state"], "uninitialized");
}

#[tokio::test]
async fn sign_transaction_flow() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    let accounts = create_vault(&mut ui).await;
    let signer = accounts[0];
    ctx.vault.authorize(Origin::from_url("https://dapp.example").unwrap());

    let (_page_conn, mut page) = connect_page(&mediator, "https://dapp.example/swap", 5);
    let message = transfer_message(signer, PublicKey::new([9; 32]), 1_500_000_000);
    let encoded = bs58::encode(message.serialize()).into_string();

    send(&page, 1, "signTransaction", json!({ "message": encoded })).await;
    wait_for_actions(&ctx, 1).await;

    let pending = ctx.actions.list();
    assert_eq!(pending[0].signers, vec![signer]);
    assert_eq!(pending[0].details.len(), 1);
    assert!(pending[0].details[0].text.contains("Transfer"), "{}", pending[0].details[0].text);

    let signed = call_ok(
        &mut ui,
        2,
        "approveSignTransaction",
        json!({ "actionKey": pending[0].key }),
    )
    .await;
    assert_eq!(signed["publicKey"], json!(signer));

    let response = next_response(&mut page).await;
    assert_eq!(response.result, Some(signed.clone()));

    let signature_bytes = bs58::decode(signed["signature"].as_str().unwrap())
        .into_vec()
        .unwrap();
    let signature = Signature::from_slice(&signature_bytes).unwrap();
    let verifying_key = VerifyingKey::from_bytes(signer.as_bytes()).unwrap();
    assert!(verifying_key.verify(&message.serialize(), &signature).is_ok());

    // Decline path
    send(&page, 2, "signTransaction", json!({ "message": encoded })).await;
    wait_for_actions(&ctx, 1).await;
    let key = ctx.actions.list()[0].key.clone();
    call_ok(&mut ui, 3, "declineSignTransaction", json!({ "actionKey": key })).await;
    let response = next_response(&mut page).await;
    assert_eq!(response.id, Some(Id::Num(2)));
    assert_eq!(error_code(&response), USER_REJECTED);
}

#[tokio::test]
async fn foreign_signers_are_refused() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;
    ctx.vault.authorize(Origin::from_url("https://dapp.example").unwrap());

    let (_page_conn, mut page) = connect_page(&mediator, "https://dapp.example", 5);
    let message = transfer_message(PublicKey::new([3; 32]), PublicKey::new([9; 32]), 1);
    let encoded = bs58::encode(message.serialize()).into_string();

    let response = call(&mut page, 1, "signTransaction", json!({ "message": encoded })).await;
    assert_eq!(error_code(&response), WALLET_STATE);
    assert!(ctx.actions.is_empty());
}

#[tokio::test]
async fn disconnect_evicts_pending_actions() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;

    let (page_conn, page) = connect_page(&mediator, "https://dapp.example", 11);
    let (_other_conn, other) = connect_page(&mediator, "https://dapp.example", 12);
    send(&page, 1, "requestAccounts", Value::Null).await;
    send(&other, 1, "requestAccounts", Value::Null).await;
    wait_for_actions(&ctx, 2).await;

    let StreamPeer {
        sender,
        mut receiver,
    } = page;
    drop(sender);
    page_conn.closed().await;

    // Only the closed tab's action is gone, and its request is never answered
    assert_eq!(ctx.actions.len(), 1);
    assert_eq!(ctx.actions.list()[0].key.tab_id, TabId(12));
    assert!(matches!(timeout(WAIT, receiver.recv()).await, Ok(None)));
    assert!(mediator.registry().has_origin(&wallet_core::mediator::OriginClass::Page(
        Origin::from_url("https://dapp.example").unwrap()
    )));
}

#[tokio::test]
async fn events_are_withheld_while_locked() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;
    call_ok(&mut ui, 1, "lockVault", Value::Null).await;

    let (_page_conn, page) = connect_page(&mediator, "https://dapp.example", 1);
    send(&page, 1, "requestAccounts", Value::Null).await;
    wait_for_actions(&ctx, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ui.receiver.try_recv().is_err());

    // Approving needs the keys
    let key = ctx.actions.list()[0].key.clone();
    let response = call(&mut ui, 2, "approveRequestAccounts", json!({ "actionKey": key })).await;
    assert_eq!(error_code(&response), WALLET_STATE);
    assert_eq!(ctx.actions.len(), 1);

    // Unlocking lets events flow again
    call_ok(&mut ui, 3, "unlockVault", json!({ "password": PASSWORD })).await;
    mediator.registry().notify_all("ping", Value::Null);
    let event = timeout(WAIT, ui.receiver.recv()).await.unwrap().unwrap();
    assert!(event.as_response().is_none());
}

#[tokio::test]
async fn action_changes_reach_the_ui() {
    let (mediator, ctx) = setup();
    let _events = mediator.spawn_action_events();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;

    let (_page_conn, page) = connect_page(&mediator, "https://dapp.example", 1);
    send(&page, 1, "requestAccounts", Value::Null).await;
    wait_for_actions(&ctx, 1).await;

    let mut methods = Vec::new();
    while methods.len() < 2 {
        let outbound = timeout(WAIT, ui.receiver.recv()).await.unwrap().unwrap();
        if let Outbound::Notification(event) = outbound {
            methods.push((event.method, event.params));
        }
    }
    methods.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(methods[0].0, "actionAdded");
    assert_eq!(methods[0].1["kind"], "requestAccounts");
    assert_eq!(methods[1], ("actionsChanged".to_string(), json!({ "count": 1 })));
}

#[tokio::test]
async fn removed_origin_is_gated_again() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;
    let origin = Origin::from_url("https://dapp.example").unwrap();
    ctx.vault.authorize(origin.clone());

    let (_page_conn, mut page) = connect_page(&mediator, "https://dapp.example/app", 1);
    let state = call_ok(&mut page, 1, "getState", Value::Null).await;
    assert_eq!(state["connected"], true);
    let response = call(&mut page, 2, "signTransaction", json!({ "message": "1111" })).await;
    assert_ne!(error_code(&response), UNAUTHORIZED);

    let removed = call_ok(
        &mut ui,
        1,
        "removeAuthorizedOrigin",
        json!({ "origin": "https://dapp.example/some/path" }),
    )
    .await;
    assert_eq!(removed, json!(true));
    assert_eq!(next_event(&mut page, "disconnect").await, Value::Null);
    assert!(!ctx.vault.is_authorized(&origin));

    let response = call(&mut page, 3, "signTransaction", json!({ "message": "1111" })).await;
    assert_eq!(error_code(&response), UNAUTHORIZED);
    let state = call_ok(&mut page, 4, "getState", Value::Null).await;
    assert_eq!(state["connected"], false);

    let origins = call_ok(&mut ui, 2, "listAuthorizedOrigins", Value::Null).await;
    assert_eq!(origins, json!([]));
    let again = call_ok(
        &mut ui,
        3,
        "removeAuthorizedOrigin",
        json!({ "origin": "https://dapp.example" }),
    )
    .await;
    assert_eq!(again, json!(false));

    // Account access needs a fresh approval
    send(&page, 5, "requestAccounts", Value::Null).await;
    wait_for_actions(&ctx, 1).await;
}

#[tokio::test]
async fn page_can_disconnect_itself() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;
    let origin = Origin::from_url("https://dapp.example").unwrap();
    ctx.vault.authorize(origin.clone());

    let (_page_conn, mut page) = connect_page(&mediator, "https://dapp.example", 1);
    let revoked = call_ok(&mut page, 1, "disconnect", Value::Null).await;
    assert_eq!(revoked, json!(true));
    assert!(!ctx.vault.is_authorized(&origin));

    let response = call(&mut page, 2, "disconnect", Value::Null).await;
    assert_eq!(error_code(&response), UNAUTHORIZED);
}

#[tokio::test]
async fn account_selection_reaches_authorized_pages() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    let first = create_vault(&mut ui).await[0];

    let added = call_ok(&mut ui, 1, "addAccount", Value::Null).await;
    let second: PublicKey = serde_json::from_value(added["publicKey"].clone()).unwrap();
    assert_ne!(second, first);
    assert_eq!(ctx.vault.accounts(), vec![first, second]);

    ctx.vault.authorize(Origin::from_url("https://dapp.example").unwrap());
    let (_dapp_conn, mut dapp) = connect_page(&mediator, "https://dapp.example", 1);
    let (_other_conn, mut other) = connect_page(&mediator, "https://other.example", 2);

    let selected = call_ok(&mut ui, 2, "selectAccount", json!({ "index": 1 })).await;
    assert_eq!(selected["publicKey"], json!(second));
    assert_eq!(ctx.vault.selected_account(), Some(second));

    // Selected account first
    let event = next_event(&mut dapp, "accountsChanged").await;
    assert_eq!(event, json!([second, first]));
    assert_quiet(&mut other).await;

    let accounts = call_ok(&mut dapp, 1, "requestAccounts", Value::Null).await;
    assert_eq!(accounts, json!([second, first]));

    let response = call(&mut ui, 3, "selectAccount", json!({ "index": 5 })).await;
    assert_eq!(error_code(&response), INVALID_PARAMS);
    assert_eq!(ctx.vault.selected_account(), Some(second));
}

#[tokio::test]
async fn network_change_is_broadcast() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;
    let (_page_conn, mut page) = connect_page(&mediator, "https://dapp.example", 1);

    let changed = call_ok(&mut ui, 1, "changeNetwork", json!({ "network": "devnet" })).await;
    assert_eq!(changed, json!({ "network": "devnet" }));
    assert_eq!(ctx.vault.network(), Network::Devnet);

    let event = next_event(&mut page, "clusterChanged").await;
    assert_eq!(event["network"], "devnet");
    assert_eq!(event["endpoint"], json!(ctx.config.endpoint(Network::Devnet)));

    let cluster = call_ok(&mut page, 1, "getCluster", Value::Null).await;
    assert_eq!(cluster["network"], "devnet");

    let response = call(&mut ui, 2, "changeNetwork", json!({ "network": "moonnet" })).await;
    assert_eq!(error_code(&response), INVALID_PARAMS);
    assert_eq!(ctx.vault.network(), Network::Devnet);
}

#[tokio::test]
async fn token_registry_is_managed_from_the_ui() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);
    create_vault(&mut ui).await;
    let mint = PublicKey::new([50; 32]);

    let added = call_ok(
        &mut ui,
        1,
        "addToken",
        json!({
            "mint": mint,
            "name": "USD Coin",
            "symbol": "USDC",
            "decimals": 6,
            "logoUri": "https://tokens.example/usdc.png",
        }),
    )
    .await;
    assert_eq!(added, json!(true));
    assert_eq!(
        ctx.vault.token(Network::MainnetBeta, &mint),
        Some(TokenMeta {
            name: "USD Coin".into(),
            symbol: "USDC".into(),
            decimals: 6,
            logo_uri: Some("https://tokens.example/usdc.png".into()),
        })
    );

    // Defaults to the selected network
    let listed = call_ok(&mut ui, 2, "listTokens", Value::Null).await;
    assert_eq!(listed[mint.to_string()]["symbol"], "USDC");
    assert_eq!(listed[mint.to_string()]["decimals"], 6);
    let devnet = call_ok(&mut ui, 3, "listTokens", json!({ "network": "devnet" })).await;
    assert_eq!(devnet, json!({}));

    let response = call(&mut ui, 4, "addToken", json!({ "mint": mint, "symbol": "X" })).await;
    assert_eq!(error_code(&response), INVALID_PARAMS);

    let removed = call_ok(&mut ui, 5, "removeToken", json!({ "mint": mint })).await;
    assert_eq!(removed, json!(true));
    let removed = call_ok(&mut ui, 6, "removeToken", json!({ "mint": mint })).await;
    assert_eq!(removed, json!(false));
    let listed = call_ok(&mut ui, 7, "listTokens", Value::Null).await;
    assert_eq!(listed, json!({}));
}

#[tokio::test]
async fn generated_mnemonic_creates_a_vault() {
    let (mediator, ctx) = setup();
    let (_ui_conn, mut ui) = connect_ui(&mediator);

    let generated = call_ok(&mut ui, 1, "generateMnemonic", Value::Null).await;
    let phrase = generated["mnemonic"].as_str().unwrap().to_string();
    assert_eq!(phrase.split_whitespace().count(), 12);

    let long = call_ok(&mut ui, 2, "generateMnemonic", json!({ "wordCount": 24 })).await;
    assert_eq!(long["mnemonic"].as_str().unwrap().split_whitespace().count(), 24);

    let response = call(&mut ui, 3, "generateMnemonic", json!({ "wordCount": 15 })).await;
    assert_eq!(error_code(&response), INVALID_PARAMS);

    let created = call_ok(
        &mut ui,
        4,
        "createVault",
        json!({ "mnemonic": phrase, "password": PASSWORD }),
    )
    .await;
    assert_eq!(created["accounts"].as_array().unwrap().len(), 1);
    assert!(ctx.vault.is_unlocked());

    let response = call(
        &mut ui,
        5,
        "createVault",
        json!({ "mnemonic": MNEMONIC, "password": PASSWORD }),
    )
    .await;
    assert_eq!(error_code(&response), WALLET_STATE);
}
