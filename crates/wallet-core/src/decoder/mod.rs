//! Instruction decoder pipeline.
//!
//! Each supported program contributes a plugin with three stages:
//!
//! 1. `decode` - pure, driven by the binary layout of the instruction
//! 2. `decorate` - async enrichment from the token registry and the network
//! 3. `render` - pure markdown text shown to the user before approval
//!
//! [`DecoderRegistry::decode_transaction`] runs the stages for every
//! instruction of a message. A failure in any stage for one instruction
//! yields a placeholder for that instruction only.

pub mod memo;
pub mod system;
pub mod token;

use crate::error::{Result, WalletError};
use crate::network::NetworkContext;
use crate::transaction::{Instruction, Message};
use crate::types::{Network, PublicKey, TokenMeta};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

pub use memo::MemoDecoder;
pub use system::SystemDecoder;
pub use token::TokenDecoder;

/// Structured result of the decode stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedInstruction {
    pub program_id: PublicKey,
    pub instruction_type: String,
    /// Insertion ordered
    pub properties: Map<String, Value>,
}

impl DecodedInstruction {
    pub fn new(program_id: PublicKey, instruction_type: impl Into<String>) -> Self {
        Self {
            program_id,
            instruction_type: instruction_type.into(),
            properties: Map::new(),
        }
    }

    /// Append a property, builder style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.properties.get(key).and_then(Value::as_u64)
    }

    pub fn pubkey(&self, key: &str) -> Option<PublicKey> {
        self.str(key).and_then(|s| s.parse().ok())
    }

    /// Property as a string, or an undecodable error naming it.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.str(key).ok_or_else(|| {
            WalletError::UndecodableInstruction(format!(
                "{} is missing property {}",
                self.instruction_type, key
            ))
        })
    }
}

/// Output for one instruction of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedInstruction {
    pub index: usize,
    pub program_id: Option<PublicKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<DecodedInstruction>,
    /// Markdown
    pub text: String,
}

impl RenderedInstruction {
    fn placeholder(index: usize, program_id: Option<PublicKey>) -> Self {
        let program = program_id
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            index,
            program_id,
            decoded: None,
            text: format!("Undecodable instruction #{} for program {}", index, program),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.decoded.is_none()
    }
}

/// Data available to the decorate stage.
pub struct DecorateContext<'a> {
    pub network: Network,
    /// Tokens the user registered for `network`
    pub tokens: &'a BTreeMap<PublicKey, TokenMeta>,
    pub client: &'a dyn NetworkContext,
}

impl DecorateContext<'_> {
    /// Token metadata from the wallet registry, then from the network.
    pub async fn mint_metadata(&self, mint: &PublicKey) -> Option<TokenMeta> {
        if let Some(meta) = self.tokens.get(mint) {
            return Some(meta.clone());
        }
        match self.client.get_mint_metadata(mint).await {
            Ok(meta) => meta,
            Err(e) => {
                debug!(%mint, "mint metadata lookup failed: {}", e);
                None
            }
        }
    }
}

/// Decoder for one on-chain program.
#[async_trait]
pub trait InstructionDecoder: Send + Sync {
    fn program_id(&self) -> PublicKey;

    /// Human readable program name.
    fn name(&self) -> &'static str;

    fn decode(&self, instruction: &Instruction) -> Result<DecodedInstruction>;

    /// Enrich `decoded`. Returns it unchanged when nothing is known.
    async fn decorate(
        &self,
        decoded: DecodedInstruction,
        _ctx: &DecorateContext<'_>,
    ) -> DecodedInstruction {
        decoded
    }

    fn render(&self, decoded: &DecodedInstruction) -> Result<String>;
}

/// Program id to decoder map, built once at startup.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<PublicKey, Arc<dyn InstructionDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the System, SPL Token and Memo decoders.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(SystemDecoder))?;
        registry.register(Arc::new(TokenDecoder))?;
        registry.register(Arc::new(MemoDecoder::v1()))?;
        registry.register(Arc::new(MemoDecoder::v2()))?;
        Ok(registry)
    }

    /// Add a decoder. Each program id can be registered once.
    pub fn register(&mut self, decoder: Arc<dyn InstructionDecoder>) -> Result<()> {
        let program_id = decoder.program_id();
        if self.decoders.contains_key(&program_id) {
            return Err(WalletError::DuplicateDecoder(program_id.to_string()));
        }
        debug!(program = decoder.name(), %program_id, "decoder registered");
        self.decoders.insert(program_id, decoder);
        Ok(())
    }

    pub fn get(&self, program_id: &PublicKey) -> Option<&Arc<dyn InstructionDecoder>> {
        self.decoders.get(program_id)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Render every instruction of `message`, in order, one output per input.
    pub async fn decode_transaction(
        &self,
        message: &Message,
        ctx: &DecorateContext<'_>,
    ) -> Vec<RenderedInstruction> {
        let mut rendered = Vec::with_capacity(message.instructions.len());
        for index in 0..message.instructions.len() {
            let program_id = message.program_id(index);
            let output = match self.decode_one(message, index, ctx).await {
                Ok(output) => output,
                Err(e) => {
                    debug!(index, "instruction not decoded: {}", e);
                    RenderedInstruction::placeholder(index, program_id)
                }
            };
            rendered.push(output);
        }
        rendered
    }

    async fn decode_one(
        &self,
        message: &Message,
        index: usize,
        ctx: &DecorateContext<'_>,
    ) -> Result<RenderedInstruction> {
        let instruction = message.instruction(index)?;
        let decoder = self.get(&instruction.program_id).ok_or_else(|| {
            WalletError::UndecodableInstruction(format!(
                "no decoder for program {}",
                instruction.program_id
            ))
        })?;

        let decoded = decoder.decode(&instruction)?;
        let decoded = decoder.decorate(decoded, ctx).await;
        let text = decoder.render(&decoded)?;

        Ok(RenderedInstruction {
            index,
            program_id: Some(instruction.program_id),
            decoded: Some(decoded),
            text,
        })
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut programs: Vec<_> = self.decoders.values().map(|d| d.name()).collect();
        programs.sort_unstable();
        f.debug_struct("DecoderRegistry")
            .field("programs", &programs)
            .finish()
    }
}

/// Account at `position`, or an undecodable error naming its `role`.
pub(crate) fn account(instruction: &Instruction, position: usize, role: &str) -> Result<PublicKey> {
    instruction
        .accounts
        .get(position)
        .map(|meta| meta.pubkey)
        .ok_or_else(|| {
            WalletError::UndecodableInstruction(format!(
                "missing {} account at position {}",
                role, position
            ))
        })
}

/// Map a short read from instruction data to an undecodable error.
pub(crate) fn truncated(e: WalletError) -> WalletError {
    match e {
        WalletError::InvalidMessage(msg) => WalletError::UndecodableInstruction(msg),
        other => other,
    }
}

/// Format a raw integer amount with `decimals` places, trimming zeros.
///
/// `format_amount(1_500_000, 6) == "1.5"`
pub fn format_amount(raw: u64, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let digits = format!("{:0>width$}", raw, width = decimals as usize + 1);
    let (whole, fraction) = digits.split_at(digits.len() - decimals as usize);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Inline code span with an abbreviated address.
pub(crate) fn addr(key: &str) -> String {
    match key.parse::<PublicKey>() {
        Ok(pk) => format!("`{}`", pk.abbreviated()),
        Err(_) => format!("`{}`", key),
    }
}

/// Untrusted text rendered literally: control characters become visible
/// escapes and markdown punctuation is backslash-escaped, so the text stays
/// on one line and cannot add emphasis, links or new blocks.
pub(crate) fn literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            if "\\`*_{}[]()<>#+-.!|~\"".contains(c) {
                out.push('\\');
            }
            out.push(c);
        }
    }
    out
}
