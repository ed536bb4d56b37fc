//! Method dispatch for page and UI connections.

use super::middleware::{Endpoint, Envelope, Reply};
use super::registry::{ConnectionRegistry, OriginClass};
use crate::actions::{ActionKey, RequestAccounts, SignTransaction, SignedMessage};
use crate::context::WalletContext;
use crate::error::{Result, WalletError};
use crate::secret::SecretString;
use crate::transaction::Message;
use crate::types::{Network, Origin, PublicKey, TabId, TokenMeta};
use crate::vault::MnemonicSeed;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

/// Methods reachable from web pages.
pub struct PageHandler {
    ctx: Arc<WalletContext>,
    registry: Arc<ConnectionRegistry>,
}

#[derive(Deserialize)]
struct SignTransactionParams {
    /// Base58 serialized message
    message: String,
}

impl PageHandler {
    pub fn new(ctx: Arc<WalletContext>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { ctx, registry }
    }

    fn request_accounts(&self, origin: &Origin, tab_id: TabId) -> Reply {
        let vault = &self.ctx.vault;
        if vault.is_unlocked() && vault.is_authorized(origin) {
            return Reply::ready(Ok(vault.accounts_for_page()));
        }

        let (respond_to, receiver) = oneshot::channel();
        let key = self
            .ctx
            .actions
            .add(origin.clone(), tab_id, RequestAccounts { respond_to });
        info!(action = %key, "account access requested");
        self.registry.notify(
            &OriginClass::Ui,
            "actionAdded",
            json!({ "key": key, "kind": "requestAccounts" }),
        );
        Reply::deferred(receiver)
    }

    fn state(&self, origin: &Origin) -> Value {
        let vault = &self.ctx.vault;
        json!({
            "state": vault.state(),
            "network": vault.network(),
            "connected": vault.is_unlocked() && vault.is_authorized(origin),
        })
    }

    async fn sign_transaction(&self, envelope: &Envelope, origin: &Origin) -> Result<Reply> {
        let params: SignTransactionParams = envelope.request.params()?;
        let message = Message::from_base58(&params.message)?;

        let vault = &self.ctx.vault;
        if !vault.is_unlocked() {
            return Err(WalletError::Locked);
        }
        let held = vault.accounts();
        let signers: Vec<PublicKey> = message
            .signers()
            .iter()
            .filter(|signer| held.contains(*signer))
            .copied()
            .collect();
        if signers.is_empty() {
            return Err(WalletError::UnknownSigner);
        }

        let details = self.ctx.describe_transaction(&message).await;

        let (respond_to, receiver) = oneshot::channel();
        let key = self.ctx.actions.add(
            origin.clone(),
            envelope.tab_id.unwrap_or_default(),
            SignTransaction {
                message: message.serialize(),
                signers,
                details,
                respond_to,
            },
        );
        info!(action = %key, "signature requested");
        self.registry.notify(
            &OriginClass::Ui,
            "actionAdded",
            json!({ "key": key, "kind": "signTransaction" }),
        );
        Ok(Reply::deferred(receiver))
    }
}

#[async_trait]
impl Endpoint for PageHandler {
    async fn call(&self, envelope: &Envelope) -> Reply {
        let origin = match envelope.require_origin() {
            Ok(origin) => origin.clone(),
            Err(e) => return Reply::error(e),
        };

        match envelope.method() {
            "requestAccounts" => {
                self.request_accounts(&origin, envelope.tab_id.unwrap_or_default())
            }
            "getCluster" => Reply::ready(Ok(json!({
                "network": self.ctx.vault.network(),
                "endpoint": self.ctx.config.endpoint(self.ctx.vault.network()),
            }))),
            "getState" => Reply::ready(Ok(self.state(&origin))),
            "signTransaction" => match self.sign_transaction(envelope, &origin).await {
                Ok(reply) => reply,
                Err(e) => Reply::error(e),
            },
            "disconnect" => {
                let revoked = self.ctx.vault.revoke(&origin);
                if revoked {
                    info!(%origin, "origin disconnected itself");
                }
                Reply::ready(Ok(revoked))
            }
            other => Reply::error(WalletError::MethodNotFound(other.to_string())),
        }
    }
}

/// Privileged methods for the extension's own UI.
pub struct UiHandler {
    ctx: Arc<WalletContext>,
    registry: Arc<ConnectionRegistry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateMnemonicParams {
    #[serde(default = "default_word_count")]
    word_count: usize,
}

fn default_word_count() -> usize {
    12
}

#[derive(Deserialize)]
struct CreateVaultParams {
    mnemonic: SecretString,
    password: SecretString,
}

#[derive(Deserialize)]
struct UnlockParams {
    password: SecretString,
}

#[derive(Deserialize)]
struct SelectAccountParams {
    index: usize,
}

#[derive(Deserialize)]
struct NetworkParams {
    network: Network,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionParams {
    action_key: ActionKey,
}

#[derive(Deserialize)]
struct TokenListParams {
    #[serde(default)]
    network: Option<Network>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTokenParams {
    #[serde(default)]
    network: Option<Network>,
    mint: PublicKey,
    #[serde(flatten)]
    meta: TokenMeta,
}

#[derive(Deserialize)]
struct RemoveTokenParams {
    #[serde(default)]
    network: Option<Network>,
    mint: PublicKey,
}

#[derive(Deserialize)]
struct OriginParams {
    origin: String,
}

impl UiHandler {
    pub fn new(ctx: Arc<WalletContext>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { ctx, registry }
    }

    async fn dispatch(&self, envelope: &Envelope) -> Result<Value> {
        let request = &envelope.request;
        let vault = &self.ctx.vault;

        match request.method.as_str() {
            "generateMnemonic" => {
                let params: GenerateMnemonicParams = request.params()?;
                let seed = MnemonicSeed::generate(params.word_count)?;
                Ok(json!({ "mnemonic": seed.phrase().expose_secret() }))
            }
            "createVault" => {
                let params: CreateVaultParams = request.params()?;
                let seed = MnemonicSeed::from_phrase(params.mnemonic.expose_secret())?;
                vault.create_vault(seed, params.password).await?;
                Ok(json!({ "accounts": vault.accounts() }))
            }
            "unlockVault" => {
                let params: UnlockParams = request.params()?;
                vault.unseal(params.password).await?;
                self.registry.notify_all("unlocked", Value::Null);
                Ok(json!({ "accounts": vault.accounts() }))
            }
            "lockVault" => {
                vault.lock();
                Ok(Value::Null)
            }
            "getState" => Ok(json!({
                "state": vault.state(),
                "network": vault.network(),
                "accounts": vault.accounts(),
                "selectedAccount": vault.selected_account(),
                "pendingActions": self.ctx.actions.len(),
            })),
            "addAccount" => {
                let public_key = vault.add_account()?;
                Ok(json!({ "publicKey": public_key }))
            }
            "selectAccount" => {
                let params: SelectAccountParams = request.params()?;
                let public_key = vault.select_account(params.index)?;
                self.announce_accounts();
                Ok(json!({ "publicKey": public_key }))
            }
            "changeNetwork" => {
                let params: NetworkParams = request.params()?;
                vault.change_network(params.network);
                self.registry.notify_all(
                    "clusterChanged",
                    json!({
                        "network": params.network,
                        "endpoint": self.ctx.config.endpoint(params.network),
                    }),
                );
                Ok(json!({ "network": params.network }))
            }
            "listActions" => Ok(serde_json::to_value(self.ctx.actions.list())?),
            "approveRequestAccounts" => {
                let params: ActionParams = request.params()?;
                self.approve_request_accounts(&params.action_key)
            }
            "declineRequestAccounts" => {
                let params: ActionParams = request.params()?;
                let action: RequestAccounts = self.ctx.actions.take_required(&params.action_key)?;
                action.reject();
                Ok(Value::Bool(true))
            }
            "approveSignTransaction" => {
                let params: ActionParams = request.params()?;
                let signed = self.approve_sign_transaction(&params.action_key)?;
                Ok(serde_json::to_value(signed)?)
            }
            "declineSignTransaction" => {
                let params: ActionParams = request.params()?;
                let action: SignTransaction = self.ctx.actions.take_required(&params.action_key)?;
                action.reject(WalletError::UserRejected);
                Ok(Value::Bool(true))
            }
            "listTokens" => {
                let params: TokenListParams = request.params()?;
                let network = params.network.unwrap_or_else(|| vault.network());
                Ok(serde_json::to_value(vault.tokens(network))?)
            }
            "addToken" => {
                let params: AddTokenParams = request.params()?;
                let network = params.network.unwrap_or_else(|| vault.network());
                vault.add_token(network, params.mint, params.meta);
                Ok(Value::Bool(true))
            }
            "removeToken" => {
                let params: RemoveTokenParams = request.params()?;
                let network = params.network.unwrap_or_else(|| vault.network());
                Ok(Value::Bool(vault.remove_token(network, &params.mint)))
            }
            "listAuthorizedOrigins" => Ok(serde_json::to_value(vault.authorized_origins())?),
            "removeAuthorizedOrigin" => {
                let params: OriginParams = request.params()?;
                let origin = Origin::from_url(&params.origin)?;
                let removed = vault.revoke(&origin);
                if removed {
                    self.registry
                        .notify(&OriginClass::Page(origin), "disconnect", Value::Null);
                }
                Ok(Value::Bool(removed))
            }
            other => Err(WalletError::MethodNotFound(other.to_string())),
        }
    }

    /// Authorize the origin and answer every pending account request it has.
    fn approve_request_accounts(&self, key: &ActionKey) -> Result<Value> {
        let vault = &self.ctx.vault;
        if !vault.is_unlocked() {
            return Err(WalletError::Locked);
        }
        let action: RequestAccounts = self.ctx.actions.take_required(key)?;
        vault.authorize(key.origin.clone());
        let accounts = vault.accounts_for_page();
        action.resolve(accounts.clone());

        for other in self
            .ctx
            .actions
            .find_by_origin_and_type::<RequestAccounts>(&key.origin)
        {
            if let Some(action) = self.ctx.actions.take::<RequestAccounts>(&other) {
                action.resolve(accounts.clone());
            }
        }
        info!(origin = %key.origin, "origin authorized");
        Ok(json!({ "accounts": accounts }))
    }

    /// Sign with the first held signer. The action stays pending if signing fails.
    fn approve_sign_transaction(&self, key: &ActionKey) -> Result<SignedMessage> {
        let vault = &self.ctx.vault;
        let signed = self
            .ctx
            .actions
            .peek::<SignTransaction, _>(key, |action| -> Result<SignedMessage> {
                let signer = action.signers.first().ok_or(WalletError::UnknownSigner)?;
                let signature = vault.sign(signer, &action.message)?;
                Ok(SignedMessage {
                    public_key: *signer,
                    signature: bs58::encode(signature).into_string(),
                })
            })
            .ok_or_else(|| WalletError::UnknownAction(key.to_string()))??;

        let action: SignTransaction = self.ctx.actions.take_required(key)?;
        action.resolve(signed.clone());
        info!(action = %key, signer = %signed.public_key, "transaction signed");
        Ok(signed)
    }

    fn announce_accounts(&self) {
        let accounts = self.ctx.vault.accounts_for_page();
        for origin in self.ctx.vault.authorized_origins() {
            self.registry
                .notify(&OriginClass::Page(origin), "accountsChanged", json!(accounts));
        }
    }
}

#[async_trait]
impl Endpoint for UiHandler {
    async fn call(&self, envelope: &Envelope) -> Reply {
        Reply::Ready(self.dispatch(envelope).await)
    }
}
