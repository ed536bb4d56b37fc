//! Error types for wallet operations.
//!
//! Every variant carries enough context to be shown to a user and maps onto a
//! JSON-RPC error code so that failures can be returned to a connection as a
//! structured response instead of tearing the connection down.

use thiserror::Error;

/// JSON-RPC: the method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// JSON-RPC: invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// JSON-RPC: malformed request object.
pub const INVALID_REQUEST: i32 = -32600;
/// JSON-RPC: internal error.
pub const INTERNAL_ERROR: i32 = -32603;
/// The user rejected the request.
pub const USER_REJECTED: i32 = 4001;
/// The requesting origin has not been authorized.
pub const UNAUTHORIZED: i32 = 4100;
/// The wallet is in a state that does not allow the call.
pub const WALLET_STATE: i32 = 4900;
/// Wrong password.
pub const INVALID_PASSWORD: i32 = 4901;
/// Instruction or message could not be decoded.
pub const DECODE_FAILED: i32 = 4902;

/// Errors that can occur in the wallet core.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Authentication tag mismatch while opening the sealed blob.
    #[error("invalid password")]
    InvalidPassword,

    /// Operation needs an unlocked vault.
    #[error("wallet is locked")]
    Locked,

    /// No wallet has been created yet.
    #[error("wallet has not been created")]
    NotInitialized,

    /// A wallet already exists and would be overwritten.
    #[error("wallet already exists")]
    AlreadyInitialized,

    /// Gated method called by an origin that is not authorized.
    #[error("origin is not authorized to call {method}")]
    UnauthorizedOrigin { method: String },

    /// Known program, unknown instruction sub-type.
    #[error("unsupported {program} instruction: {tag}")]
    UnsupportedInstruction { program: String, tag: u32 },

    /// Instruction data or accounts do not match the expected layout.
    #[error("undecodable instruction: {0}")]
    UndecodableInstruction(String),

    /// Key derivation or cipher failure.
    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid transaction message: {0}")]
    InvalidMessage(String),

    /// Action key does not match a pending action of the expected type.
    #[error("no pending action for {0}")]
    UnknownAction(String),

    #[error("no account at index {0}")]
    UnknownAccount(usize),

    /// None of the required signers belongs to this wallet.
    #[error("wallet holds none of the required signers")]
    UnknownSigner,

    #[error("user rejected the request")]
    UserRejected,

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A decoder for this program is already registered.
    #[error("decoder already registered for program {0}")]
    DuplicateDecoder(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("telemetry error: {0}")]
    Telemetry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WalletError {
    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            WalletError::MethodNotFound(_) => METHOD_NOT_FOUND,
            WalletError::InvalidParams(_)
            | WalletError::InvalidMnemonic(_)
            | WalletError::InvalidPublicKey(_)
            | WalletError::UnknownAccount(_)
            | WalletError::UnknownAction(_) => INVALID_PARAMS,
            WalletError::UserRejected => USER_REJECTED,
            WalletError::UnauthorizedOrigin { .. } => UNAUTHORIZED,
            WalletError::Locked
            | WalletError::NotInitialized
            | WalletError::AlreadyInitialized
            | WalletError::UnknownSigner => WALLET_STATE,
            WalletError::InvalidPassword => INVALID_PASSWORD,
            WalletError::UnsupportedInstruction { .. }
            | WalletError::UndecodableInstruction(_)
            | WalletError::InvalidMessage(_) => DECODE_FAILED,
            WalletError::Crypto(_)
            | WalletError::DuplicateDecoder(_)
            | WalletError::Network(_)
            | WalletError::Config(_)
            | WalletError::Telemetry(_)
            | WalletError::Io(_)
            | WalletError::Serialization(_) => INTERNAL_ERROR,
        }
    }

    /// Method name carried by an authorization failure.
    pub fn method(&self) -> Option<&str> {
        match self {
            WalletError::UnauthorizedOrigin { method } => Some(method),
            _ => None,
        }
    }
}

/// Result type for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;
