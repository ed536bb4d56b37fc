//! Memo program. The instruction data is the memo text itself.

use super::{DecodedInstruction, InstructionDecoder, addr, literal};
use crate::error::{Result, WalletError};
use crate::transaction::Instruction;
use crate::types::PublicKey;
use async_trait::async_trait;
use serde_json::Value;

/// `MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr`
pub const PROGRAM_ID_V2: PublicKey = PublicKey::new([
    5, 74, 83, 90, 153, 41, 33, 6, 77, 36, 232, 113, 96, 218, 56, 124, 124, 53, 181, 221, 188,
    146, 187, 129, 228, 31, 168, 64, 65, 5, 68, 141,
]);

/// `Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo`
pub const PROGRAM_ID_V1: PublicKey = PublicKey::new([
    5, 74, 83, 80, 248, 93, 200, 130, 214, 20, 165, 86, 114, 120, 138, 41, 109, 223, 30, 171,
    171, 208, 166, 6, 120, 136, 73, 50, 244, 238, 246, 160,
]);

pub struct MemoDecoder {
    program_id: PublicKey,
}

impl MemoDecoder {
    pub fn v1() -> Self {
        Self {
            program_id: PROGRAM_ID_V1,
        }
    }

    pub fn v2() -> Self {
        Self {
            program_id: PROGRAM_ID_V2,
        }
    }
}

#[async_trait]
impl InstructionDecoder for MemoDecoder {
    fn program_id(&self) -> PublicKey {
        self.program_id
    }

    fn name(&self) -> &'static str {
        if self.program_id == PROGRAM_ID_V1 {
            "Memo Program (v1)"
        } else {
            "Memo Program"
        }
    }

    fn decode(&self, ix: &Instruction) -> Result<DecodedInstruction> {
        let text = std::str::from_utf8(&ix.data)
            .map_err(|e| WalletError::UndecodableInstruction(format!("memo is not utf-8: {}", e)))?;
        let signers: Vec<Value> = ix
            .accounts
            .iter()
            .filter(|a| a.is_signer)
            .map(|a| Value::String(a.pubkey.to_string()))
            .collect();
        Ok(DecodedInstruction::new(self.program_id, "memo")
            .with("memo", text)
            .with("signers", signers))
    }

    fn render(&self, d: &DecodedInstruction) -> Result<String> {
        let memo = d.require_str("memo")?;
        let signers: Vec<String> = d
            .properties
            .get("signers")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).map(addr).collect())
            .unwrap_or_default();

        let mut text = format!("**Memo**: {}", literal(memo));
        if !signers.is_empty() {
            text.push_str(&format!(" (signed by {})", signers.join(", ")));
        }
        Ok(text)
    }
}
