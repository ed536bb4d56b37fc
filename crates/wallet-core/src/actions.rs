//! Pending actions awaiting a user decision.
//!
//! A page request that needs consent parks an [`Action`] here and waits on
//! the receiving half of a oneshot channel. The trusted UI later resolves or
//! rejects the action by its [`ActionKey`], which consumes the sending half,
//! so an action settles at most once. Dropping an action without settling it
//! (connection teardown) closes the channel and the waiting request gets no
//! response.

use crate::decoder::RenderedInstruction;
use crate::error::{Result, WalletError};
use crate::types::{Origin, PublicKey, TabId};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

/// Identity of one pending action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionKey {
    pub origin: Origin,
    pub tab_id: TabId,
    pub request_id: Uuid,
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}/{}", self.origin, self.tab_id, self.request_id)
    }
}

/// Outcome delivered to a page once it is approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub public_key: PublicKey,
    /// Base58 Ed25519 signature
    pub signature: String,
}

/// Page asks for the wallet's accounts.
#[derive(Debug)]
pub struct RequestAccounts {
    pub respond_to: oneshot::Sender<Result<Vec<PublicKey>>>,
}

impl RequestAccounts {
    pub fn resolve(self, accounts: Vec<PublicKey>) {
        if self.respond_to.send(Ok(accounts)).is_err() {
            debug!("requestAccounts caller went away before resolution");
        }
    }

    pub fn reject(self) {
        if self.respond_to.send(Err(WalletError::UserRejected)).is_err() {
            debug!("requestAccounts caller went away before rejection");
        }
    }
}

/// Page asks for a signature over a transaction message.
#[derive(Debug)]
pub struct SignTransaction {
    pub message: Vec<u8>,
    /// Required signers held by this wallet
    pub signers: Vec<PublicKey>,
    pub details: Vec<RenderedInstruction>,
    pub respond_to: oneshot::Sender<Result<SignedMessage>>,
}

impl SignTransaction {
    pub fn resolve(self, signed: SignedMessage) {
        if self.respond_to.send(Ok(signed)).is_err() {
            debug!("signTransaction caller went away before resolution");
        }
    }

    pub fn reject(self, error: WalletError) {
        if self.respond_to.send(Err(error)).is_err() {
            debug!("signTransaction caller went away before rejection");
        }
    }
}

/// Kind tag of an action, as shown to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    RequestAccounts,
    SignTransaction,
}

#[derive(Debug)]
pub enum Action {
    RequestAccounts(RequestAccounts),
    SignTransaction(SignTransaction),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::RequestAccounts(_) => ActionKind::RequestAccounts,
            Action::SignTransaction(_) => ActionKind::SignTransaction,
        }
    }

    fn summary(&self, key: &ActionKey) -> ActionSummary {
        let (signers, details) = match self {
            Action::RequestAccounts(_) => (Vec::new(), Vec::new()),
            Action::SignTransaction(sign) => (sign.signers.clone(), sign.details.clone()),
        };
        ActionSummary {
            key: key.clone(),
            kind: self.kind(),
            signers,
            details,
        }
    }
}

/// Typed access to one [`Action`] variant.
pub trait ActionPayload: Sized {
    const KIND: ActionKind;

    fn into_action(self) -> Action;

    fn from_action(action: Action) -> std::result::Result<Self, Action>;

    fn from_action_ref(action: &Action) -> Option<&Self>;
}

impl ActionPayload for RequestAccounts {
    const KIND: ActionKind = ActionKind::RequestAccounts;

    fn into_action(self) -> Action {
        Action::RequestAccounts(self)
    }

    fn from_action(action: Action) -> std::result::Result<Self, Action> {
        match action {
            Action::RequestAccounts(inner) => Ok(inner),
            other => Err(other),
        }
    }

    fn from_action_ref(action: &Action) -> Option<&Self> {
        match action {
            Action::RequestAccounts(inner) => Some(inner),
            _ => None,
        }
    }
}

impl ActionPayload for SignTransaction {
    const KIND: ActionKind = ActionKind::SignTransaction;

    fn into_action(self) -> Action {
        Action::SignTransaction(self)
    }

    fn from_action(action: Action) -> std::result::Result<Self, Action> {
        match action {
            Action::SignTransaction(inner) => Ok(inner),
            other => Err(other),
        }
    }

    fn from_action_ref(action: &Action) -> Option<&Self> {
        match action {
            Action::SignTransaction(inner) => Some(inner),
            _ => None,
        }
    }
}

/// What the UI sees of a pending action; never includes the completion handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub key: ActionKey,
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signers: Vec<PublicKey>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<RenderedInstruction>,
}

/// Emitted whenever the number of pending actions changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionsChanged {
    pub count: usize,
}

/// Insertion ordered queue of pending actions, shared by handle.
#[derive(Clone)]
pub struct ActionQueue {
    actions: Arc<Mutex<IndexMap<ActionKey, Action>>>,
    events: broadcast::Sender<ActionsChanged>,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            actions: Arc::new(Mutex::new(IndexMap::new())),
            events,
        }
    }

    /// Park `payload` under a fresh request id.
    pub fn add<T: ActionPayload>(&self, origin: Origin, tab_id: TabId, payload: T) -> ActionKey {
        let key = ActionKey {
            origin,
            tab_id,
            request_id: Uuid::new_v4(),
        };
        let count = {
            let mut actions = self.actions.lock();
            actions.insert(key.clone(), payload.into_action());
            actions.len()
        };
        debug!(action = %key, kind = ?T::KIND, "action added");
        self.emit(count);
        key
    }

    pub fn get(&self, key: &ActionKey) -> Option<ActionSummary> {
        self.actions.lock().get(key).map(|action| action.summary(key))
    }

    /// Remove and return the action at `key` if it is a `T`.
    ///
    /// An action of a different kind is left in place.
    pub fn take<T: ActionPayload>(&self, key: &ActionKey) -> Option<T> {
        let (payload, count) = {
            let mut actions = self.actions.lock();
            if actions.get(key).map(Action::kind) != Some(T::KIND) {
                return None;
            }
            let action = actions.shift_remove(key)?;
            let payload = T::from_action(action).ok()?;
            (payload, actions.len())
        };
        self.emit(count);
        Some(payload)
    }

    /// Run `f` on the action at `key` without removing it, if it is a `T`.
    pub fn peek<T: ActionPayload, R>(&self, key: &ActionKey, f: impl FnOnce(&T) -> R) -> Option<R> {
        let actions = self.actions.lock();
        actions.get(key).and_then(T::from_action_ref).map(f)
    }

    /// Like [`take`](Self::take), but an error naming `key` when absent.
    pub fn take_required<T: ActionPayload>(&self, key: &ActionKey) -> Result<T> {
        self.take(key)
            .ok_or_else(|| WalletError::UnknownAction(key.to_string()))
    }

    /// Drop the action without settling it.
    pub fn delete(&self, key: &ActionKey) -> bool {
        let (removed, count) = {
            let mut actions = self.actions.lock();
            let removed = actions.shift_remove(key);
            (removed, actions.len())
        };
        match removed {
            Some(_) => {
                self.emit(count);
                true
            }
            None => false,
        }
    }

    /// Pending actions in arrival order.
    pub fn list(&self) -> Vec<ActionSummary> {
        self.actions
            .lock()
            .iter()
            .map(|(key, action)| action.summary(key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of every pending `T` from `origin`, any tab.
    pub fn find_by_origin_and_type<T: ActionPayload>(&self, origin: &Origin) -> Vec<ActionKey> {
        self.actions
            .lock()
            .iter()
            .filter(|(key, action)| key.origin == *origin && action.kind() == T::KIND)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Evict everything that belongs to one tab of one origin.
    ///
    /// Completion handles are dropped unsettled. Returns the number evicted.
    pub fn delete_by_origin_and_tab(&self, origin: &Origin, tab_id: TabId) -> usize {
        let (evicted, count) = {
            let mut actions = self.actions.lock();
            let before = actions.len();
            actions.retain(|key, _| !(key.origin == *origin && key.tab_id == tab_id));
            (before - actions.len(), actions.len())
        };
        if evicted > 0 {
            debug!(%origin, %tab_id, evicted, "actions evicted");
            self.emit(count);
        }
        evicted
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActionsChanged> {
        self.events.subscribe()
    }

    fn emit(&self, count: usize) {
        // No subscribers is fine
        let _ = self.events.send(ActionsChanged { count });
    }
}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.len())
            .finish()
    }
}
