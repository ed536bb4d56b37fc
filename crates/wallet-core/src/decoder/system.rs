//! System program: account creation, transfers and durable nonces.

use super::{DecodedInstruction, InstructionDecoder, account, addr, format_amount, literal, truncated};
use crate::error::{Result, WalletError};
use crate::transaction::{Instruction, Reader};
use crate::types::PublicKey;
use async_trait::async_trait;

pub const PROGRAM_ID: PublicKey = PublicKey::new([0u8; 32]);

/// Decimals of the native token
pub const LAMPORT_DECIMALS: u8 = 9;

const CREATE_ACCOUNT: u32 = 0;
const ASSIGN: u32 = 1;
const TRANSFER: u32 = 2;
const CREATE_ACCOUNT_WITH_SEED: u32 = 3;
const ADVANCE_NONCE_ACCOUNT: u32 = 4;
const WITHDRAW_NONCE_ACCOUNT: u32 = 5;
const INITIALIZE_NONCE_ACCOUNT: u32 = 6;
const AUTHORIZE_NONCE_ACCOUNT: u32 = 7;
const ALLOCATE: u32 = 8;

/// Seeds longer than this are rejected on chain
const MAX_SEED_LEN: u64 = 32;

pub struct SystemDecoder;

#[async_trait]
impl InstructionDecoder for SystemDecoder {
    fn program_id(&self) -> PublicKey {
        PROGRAM_ID
    }

    fn name(&self) -> &'static str {
        "System Program"
    }

    fn decode(&self, ix: &Instruction) -> Result<DecodedInstruction> {
        let mut data = Reader::new(&ix.data);
        let tag = data.u32().map_err(truncated)?;

        let decoded = match tag {
            CREATE_ACCOUNT => DecodedInstruction::new(PROGRAM_ID, "createAccount")
                .with("from", account(ix, 0, "funding")?.to_string())
                .with("newAccount", account(ix, 1, "new")?.to_string())
                .with("lamports", data.u64().map_err(truncated)?)
                .with("space", data.u64().map_err(truncated)?)
                .with("owner", data.pubkey().map_err(truncated)?.to_string()),
            ASSIGN => DecodedInstruction::new(PROGRAM_ID, "assign")
                .with("account", account(ix, 0, "assigned")?.to_string())
                .with("owner", data.pubkey().map_err(truncated)?.to_string()),
            TRANSFER => DecodedInstruction::new(PROGRAM_ID, "transfer")
                .with("from", account(ix, 0, "funding")?.to_string())
                .with("to", account(ix, 1, "recipient")?.to_string())
                .with("lamports", data.u64().map_err(truncated)?),
            CREATE_ACCOUNT_WITH_SEED => {
                let base = data.pubkey().map_err(truncated)?;
                let seed = read_seed(&mut data)?;
                DecodedInstruction::new(PROGRAM_ID, "createAccountWithSeed")
                    .with("from", account(ix, 0, "funding")?.to_string())
                    .with("newAccount", account(ix, 1, "new")?.to_string())
                    .with("base", base.to_string())
                    .with("seed", seed)
                    .with("lamports", data.u64().map_err(truncated)?)
                    .with("space", data.u64().map_err(truncated)?)
                    .with("owner", data.pubkey().map_err(truncated)?.to_string())
            }
            ADVANCE_NONCE_ACCOUNT => DecodedInstruction::new(PROGRAM_ID, "advanceNonce")
                .with("nonceAccount", account(ix, 0, "nonce")?.to_string())
                .with("authority", account(ix, 2, "nonce authority")?.to_string()),
            WITHDRAW_NONCE_ACCOUNT => DecodedInstruction::new(PROGRAM_ID, "withdrawNonce")
                .with("nonceAccount", account(ix, 0, "nonce")?.to_string())
                .with("to", account(ix, 1, "recipient")?.to_string())
                .with("authority", account(ix, 4, "nonce authority")?.to_string())
                .with("lamports", data.u64().map_err(truncated)?),
            INITIALIZE_NONCE_ACCOUNT => DecodedInstruction::new(PROGRAM_ID, "initializeNonce")
                .with("nonceAccount", account(ix, 0, "nonce")?.to_string())
                .with("authority", data.pubkey().map_err(truncated)?.to_string()),
            AUTHORIZE_NONCE_ACCOUNT => DecodedInstruction::new(PROGRAM_ID, "authorizeNonce")
                .with("nonceAccount", account(ix, 0, "nonce")?.to_string())
                .with("authority", account(ix, 1, "nonce authority")?.to_string())
                .with("newAuthority", data.pubkey().map_err(truncated)?.to_string()),
            ALLOCATE => DecodedInstruction::new(PROGRAM_ID, "allocate")
                .with("account", account(ix, 0, "allocated")?.to_string())
                .with("space", data.u64().map_err(truncated)?),
            other => {
                return Err(WalletError::UnsupportedInstruction {
                    program: self.name().to_string(),
                    tag: other,
                });
            }
        };
        Ok(decoded)
    }

    fn render(&self, d: &DecodedInstruction) -> Result<String> {
        let sol = |key: &str| -> Result<String> {
            let lamports = d.u64(key).ok_or_else(|| {
                WalletError::UndecodableInstruction(format!("{} is missing {}", d.instruction_type, key))
            })?;
            Ok(format!("{} SOL", format_amount(lamports, LAMPORT_DECIMALS)))
        };

        let text = match d.instruction_type.as_str() {
            "createAccount" => format!(
                "**Create account** {} funded with {} by {}, {} bytes owned by {}",
                addr(d.require_str("newAccount")?),
                sol("lamports")?,
                addr(d.require_str("from")?),
                d.u64("space").unwrap_or_default(),
                addr(d.require_str("owner")?),
            ),
            "assign" => format!(
                "**Assign** {} to program {}",
                addr(d.require_str("account")?),
                addr(d.require_str("owner")?),
            ),
            "transfer" => format!(
                "**Transfer** {} from {} to {}",
                sol("lamports")?,
                addr(d.require_str("from")?),
                addr(d.require_str("to")?),
            ),
            "createAccountWithSeed" => format!(
                "**Create account** {} with seed \"{}\" from base {}, funded with {}",
                addr(d.require_str("newAccount")?),
                literal(d.require_str("seed")?),
                addr(d.require_str("base")?),
                sol("lamports")?,
            ),
            "advanceNonce" => format!(
                "**Advance nonce** {}",
                addr(d.require_str("nonceAccount")?)
            ),
            "withdrawNonce" => format!(
                "**Withdraw** {} from nonce {} to {}",
                sol("lamports")?,
                addr(d.require_str("nonceAccount")?),
                addr(d.require_str("to")?),
            ),
            "initializeNonce" => format!(
                "**Initialize nonce** {} with authority {}",
                addr(d.require_str("nonceAccount")?),
                addr(d.require_str("authority")?),
            ),
            "authorizeNonce" => format!(
                "**Change nonce authority** of {} to {}",
                addr(d.require_str("nonceAccount")?),
                addr(d.require_str("newAuthority")?),
            ),
            "allocate" => format!(
                "**Allocate** {} bytes for {}",
                d.u64("space").unwrap_or_default(),
                addr(d.require_str("account")?),
            ),
            other => {
                return Err(WalletError::UndecodableInstruction(format!(
                    "no renderer for system instruction {}",
                    other
                )));
            }
        };
        Ok(text)
    }
}

/// Length prefixed (u64) UTF-8 seed string.
fn read_seed(data: &mut Reader<'_>) -> Result<String> {
    let len = data.u64().map_err(truncated)?;
    if len > MAX_SEED_LEN {
        return Err(WalletError::UndecodableInstruction(format!(
            "seed length {} exceeds {}",
            len, MAX_SEED_LEN
        )));
    }
    let bytes = data.bytes(len as usize).map_err(truncated)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| WalletError::UndecodableInstruction("seed is not utf-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::AccountMeta;

    fn meta(byte: u8, is_signer: bool) -> AccountMeta {
        AccountMeta {
            pubkey: PublicKey::new([byte; 32]),
            is_signer,
            is_writable: true,
        }
    }

    fn instruction(accounts: Vec<AccountMeta>, data: Vec<u8>) -> Instruction {
        Instruction {
            program_id: PROGRAM_ID,
            accounts,
            data,
        }
    }

    #[test]
    fn test_transfer() {
        let mut data = TRANSFER.to_le_bytes().to_vec();
        data.extend_from_slice(&1_500_000_000u64.to_le_bytes());
        let ix = instruction(vec![meta(1, true), meta(2, false)], data);

        let decoded = SystemDecoder.decode(&ix).unwrap();
        assert_eq!(decoded.instruction_type, "transfer");
        assert_eq!(decoded.u64("lamports"), Some(1_500_000_000));
        assert_eq!(decoded.pubkey("to"), Some(PublicKey::new([2; 32])));

        let text = SystemDecoder.render(&decoded).unwrap();
        assert!(text.starts_with("**Transfer** 1.5 SOL from `"));
    }

    #[test]
    fn test_create_account_with_seed() {
        let mut data = CREATE_ACCOUNT_WITH_SEED.to_le_bytes().to_vec();
        data.extend_from_slice(&[7u8; 32]);
        data.extend_from_slice(&5u64.to_le_bytes());
        data.extend_from_slice(b"stake");
        data.extend_from_slice(&1_000u64.to_le_bytes());
        data.extend_from_slice(&200u64.to_le_bytes());
        data.extend_from_slice(&[8u8; 32]);
        let ix = instruction(vec![meta(1, true), meta(2, false)], data);

        let decoded = SystemDecoder.decode(&ix).unwrap();
        assert_eq!(decoded.str("seed"), Some("stake"));
        assert_eq!(decoded.u64("space"), Some(200));
        assert!(SystemDecoder.render(&decoded).unwrap().contains("\"stake\""));
    }

    #[test]
    fn test_seed_is_rendered_literally() {
        let seed = b"x\"\n**Transfer** 9 SOL";
        let mut data = CREATE_ACCOUNT_WITH_SEED.to_le_bytes().to_vec();
        data.extend_from_slice(&[7u8; 32]);
        data.extend_from_slice(&(seed.len() as u64).to_le_bytes());
        data.extend_from_slice(seed);
        data.extend_from_slice(&1_000u64.to_le_bytes());
        data.extend_from_slice(&200u64.to_le_bytes());
        data.extend_from_slice(&[8u8; 32]);
        let ix = instruction(vec![meta(1, true), meta(2, false)], data);

        let text = SystemDecoder.render(&SystemDecoder.decode(&ix).unwrap()).unwrap();
        assert!(!text.contains('\n'));
        assert!(!text.contains("**Transfer**"));
        assert!(text.contains("with seed \"x\\\"\\n\\*\\*Transfer\\*\\* 9 SOL\""));
    }

    #[test]
    fn test_property_order_follows_layout() {
        let mut data = CREATE_ACCOUNT.to_le_bytes().to_vec();
        data.extend_from_slice(&10u64.to_le_bytes());
        data.extend_from_slice(&165u64.to_le_bytes());
        data.extend_from_slice(&[6u8; 32]);
        let ix = instruction(vec![meta(1, true), meta(2, true)], data);

        let decoded = SystemDecoder.decode(&ix).unwrap();
        let keys: Vec<_> = decoded.properties.keys().map(String::as_str).collect();
        assert_eq!(keys, ["from", "newAccount", "lamports", "space", "owner"]);
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let ix = instruction(vec![], 42u32.to_le_bytes().to_vec());
        assert!(matches!(
            SystemDecoder.decode(&ix),
            Err(WalletError::UnsupportedInstruction { tag: 42, .. })
        ));
    }

    #[test]
    fn test_missing_account_is_undecodable() {
        let mut data = TRANSFER.to_le_bytes().to_vec();
        data.extend_from_slice(&1u64.to_le_bytes());
        let ix = instruction(vec![meta(1, true)], data);
        assert!(matches!(
            SystemDecoder.decode(&ix),
            Err(WalletError::UndecodableInstruction(_))
        ));
    }

    #[test]
    fn test_short_data_is_undecodable() {
        let ix = instruction(vec![meta(1, true), meta(2, false)], vec![2, 0]);
        assert!(matches!(
            SystemDecoder.decode(&ix),
            Err(WalletError::UndecodableInstruction(_))
        ));
    }
}
