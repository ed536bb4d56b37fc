//! SPL Token program.

use super::{
    DecodedInstruction, DecorateContext, InstructionDecoder, account, addr, format_amount,
    truncated,
};
use crate::error::{Result, WalletError};
use crate::transaction::{Instruction, Reader};
use crate::types::PublicKey;
use async_trait::async_trait;
use tracing::debug;

/// `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const PROGRAM_ID: PublicKey = PublicKey::new([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// Size of a token account; the mint is its first field
const TOKEN_ACCOUNT_LEN: usize = 165;

const INITIALIZE_MINT: u8 = 0;
const INITIALIZE_ACCOUNT: u8 = 1;
const TRANSFER: u8 = 3;
const APPROVE: u8 = 4;
const REVOKE: u8 = 5;
const SET_AUTHORITY: u8 = 6;
const MINT_TO: u8 = 7;
const BURN: u8 = 8;
const CLOSE_ACCOUNT: u8 = 9;
const FREEZE_ACCOUNT: u8 = 10;
const THAW_ACCOUNT: u8 = 11;
const TRANSFER_CHECKED: u8 = 12;

pub struct TokenDecoder;

#[async_trait]
impl InstructionDecoder for TokenDecoder {
    fn program_id(&self) -> PublicKey {
        PROGRAM_ID
    }

    fn name(&self) -> &'static str {
        "Token Program"
    }

    fn decode(&self, ix: &Instruction) -> Result<DecodedInstruction> {
        let mut data = Reader::new(&ix.data);
        let tag = data.u8().map_err(truncated)?;
        let new = |kind: &str| DecodedInstruction::new(PROGRAM_ID, kind);

        let decoded = match tag {
            INITIALIZE_MINT => {
                let decimals = data.u8().map_err(truncated)?;
                let mint_authority = data.pubkey().map_err(truncated)?;
                let freeze_authority = optional_pubkey(&mut data)?;
                new("initializeMint")
                    .with("mint", account(ix, 0, "mint")?.to_string())
                    .with("decimals", decimals)
                    .with("mintAuthority", mint_authority.to_string())
                    .with("freezeAuthority", freeze_authority.map(|k| k.to_string()))
            }
            INITIALIZE_ACCOUNT => new("initializeAccount")
                .with("account", account(ix, 0, "token")?.to_string())
                .with("mint", account(ix, 1, "mint")?.to_string())
                .with("owner", account(ix, 2, "owner")?.to_string()),
            TRANSFER => new("transfer")
                .with("source", account(ix, 0, "source")?.to_string())
                .with("destination", account(ix, 1, "destination")?.to_string())
                .with("authority", account(ix, 2, "authority")?.to_string())
                .with("amount", data.u64().map_err(truncated)?),
            APPROVE => new("approve")
                .with("source", account(ix, 0, "source")?.to_string())
                .with("delegate", account(ix, 1, "delegate")?.to_string())
                .with("authority", account(ix, 2, "owner")?.to_string())
                .with("amount", data.u64().map_err(truncated)?),
            REVOKE => new("revoke")
                .with("source", account(ix, 0, "source")?.to_string())
                .with("authority", account(ix, 1, "owner")?.to_string()),
            SET_AUTHORITY => {
                let authority_type = data.u8().map_err(truncated)?;
                let new_authority = optional_pubkey(&mut data)?;
                new("setAuthority")
                    .with("account", account(ix, 0, "target")?.to_string())
                    .with("authority", account(ix, 1, "current authority")?.to_string())
                    .with("authorityType", authority_type_name(authority_type)?)
                    .with("newAuthority", new_authority.map(|k| k.to_string()))
            }
            MINT_TO => new("mintTo")
                .with("mint", account(ix, 0, "mint")?.to_string())
                .with("destination", account(ix, 1, "destination")?.to_string())
                .with("authority", account(ix, 2, "mint authority")?.to_string())
                .with("amount", data.u64().map_err(truncated)?),
            BURN => new("burn")
                .with("account", account(ix, 0, "source")?.to_string())
                .with("mint", account(ix, 1, "mint")?.to_string())
                .with("authority", account(ix, 2, "owner")?.to_string())
                .with("amount", data.u64().map_err(truncated)?),
            CLOSE_ACCOUNT => new("closeAccount")
                .with("account", account(ix, 0, "closed")?.to_string())
                .with("destination", account(ix, 1, "destination")?.to_string())
                .with("authority", account(ix, 2, "owner")?.to_string()),
            FREEZE_ACCOUNT | THAW_ACCOUNT => {
                let kind = if tag == FREEZE_ACCOUNT {
                    "freezeAccount"
                } else {
                    "thawAccount"
                };
                new(kind)
                    .with("account", account(ix, 0, "token")?.to_string())
                    .with("mint", account(ix, 1, "mint")?.to_string())
                    .with("authority", account(ix, 2, "freeze authority")?.to_string())
            }
            TRANSFER_CHECKED => new("transferChecked")
                .with("source", account(ix, 0, "source")?.to_string())
                .with("mint", account(ix, 1, "mint")?.to_string())
                .with("destination", account(ix, 2, "destination")?.to_string())
                .with("authority", account(ix, 3, "authority")?.to_string())
                .with("amount", data.u64().map_err(truncated)?)
                .with("decimals", data.u8().map_err(truncated)?),
            other => {
                return Err(WalletError::UnsupportedInstruction {
                    program: self.name().to_string(),
                    tag: other as u32,
                });
            }
        };
        Ok(decoded)
    }

    async fn decorate(
        &self,
        mut decoded: DecodedInstruction,
        ctx: &DecorateContext<'_>,
    ) -> DecodedInstruction {
        let Some(amount) = decoded.u64("amount") else {
            return decoded;
        };

        let mint = match decoded.pubkey("mint") {
            Some(mint) => Some(mint),
            None => match decoded.pubkey("source") {
                Some(source) => mint_of_token_account(&source, ctx).await,
                None => None,
            },
        };
        let Some(mint) = mint else {
            return decoded;
        };

        let meta = ctx.mint_metadata(&mint).await;
        let decimals = meta
            .as_ref()
            .map(|m| m.decimals)
            .or_else(|| decoded.u64("decimals").and_then(|d| u8::try_from(d).ok()));

        if !decoded.properties.contains_key("mint") {
            decoded.set("mint", mint.to_string());
        }
        if let Some(decimals) = decimals {
            decoded.set("uiAmount", format_amount(amount, decimals));
        }
        if let Some(meta) = meta {
            decoded.set("symbol", meta.symbol);
        }
        decoded
    }

    fn render(&self, d: &DecodedInstruction) -> Result<String> {
        let amount = || -> Result<String> {
            let raw = d.u64("amount").ok_or_else(|| {
                WalletError::UndecodableInstruction(format!("{} is missing amount", d.instruction_type))
            })?;
            let value = d
                .str("uiAmount")
                .map(str::to_string)
                .unwrap_or_else(|| raw.to_string());
            let unit = match (d.str("symbol"), d.str("mint")) {
                (Some(symbol), _) => symbol.to_string(),
                (None, Some(mint)) => format!("of token {}", addr(mint)),
                (None, None) => "tokens".to_string(),
            };
            Ok(format!("{} {}", value, unit))
        };

        let text = match d.instruction_type.as_str() {
            "initializeMint" => format!(
                "**Initialize mint** {} with {} decimals, mint authority {}",
                addr(d.require_str("mint")?),
                d.u64("decimals").unwrap_or_default(),
                addr(d.require_str("mintAuthority")?),
            ),
            "initializeAccount" => format!(
                "**Initialize token account** {} for mint {} owned by {}",
                addr(d.require_str("account")?),
                addr(d.require_str("mint")?),
                addr(d.require_str("owner")?),
            ),
            "transfer" | "transferChecked" => format!(
                "**Transfer** {} from {} to {}",
                amount()?,
                addr(d.require_str("source")?),
                addr(d.require_str("destination")?),
            ),
            "approve" => format!(
                "**Approve** {} to spend {} from {}",
                addr(d.require_str("delegate")?),
                amount()?,
                addr(d.require_str("source")?),
            ),
            "revoke" => format!(
                "**Revoke** delegate of {}",
                addr(d.require_str("source")?)
            ),
            "setAuthority" => match d.str("newAuthority") {
                Some(new_authority) => format!(
                    "**Set {} authority** of {} to {}",
                    d.require_str("authorityType")?,
                    addr(d.require_str("account")?),
                    addr(new_authority),
                ),
                None => format!(
                    "**Remove {} authority** of {}",
                    d.require_str("authorityType")?,
                    addr(d.require_str("account")?),
                ),
            },
            "mintTo" => format!(
                "**Mint** {} to {}",
                amount()?,
                addr(d.require_str("destination")?),
            ),
            "burn" => format!(
                "**Burn** {} from {}",
                amount()?,
                addr(d.require_str("account")?),
            ),
            "closeAccount" => format!(
                "**Close token account** {} and send rent to {}",
                addr(d.require_str("account")?),
                addr(d.require_str("destination")?),
            ),
            "freezeAccount" => format!("**Freeze** {}", addr(d.require_str("account")?)),
            "thawAccount" => format!("**Thaw** {}", addr(d.require_str("account")?)),
            other => {
                return Err(WalletError::UndecodableInstruction(format!(
                    "no renderer for token instruction {}",
                    other
                )));
            }
        };
        Ok(text)
    }
}

/// One byte presence flag followed by a key when present.
fn optional_pubkey(data: &mut Reader<'_>) -> Result<Option<PublicKey>> {
    match data.u8().map_err(truncated)? {
        0 => Ok(None),
        1 => Ok(Some(data.pubkey().map_err(truncated)?)),
        flag => Err(WalletError::UndecodableInstruction(format!(
            "invalid option flag {}",
            flag
        ))),
    }
}

fn authority_type_name(value: u8) -> Result<&'static str> {
    match value {
        0 => Ok("mint"),
        1 => Ok("freeze"),
        2 => Ok("owner"),
        3 => Ok("close"),
        other => Err(WalletError::UndecodableInstruction(format!(
            "unknown authority type {}",
            other
        ))),
    }
}

async fn mint_of_token_account(account: &PublicKey, ctx: &DecorateContext<'_>) -> Option<PublicKey> {
    let info = match ctx.client.get_account_info(account).await {
        Ok(info) => info?,
        Err(e) => {
            debug!(%account, "token account lookup failed: {}", e);
            return None;
        }
    };
    if info.owner != PROGRAM_ID || info.data.len() < TOKEN_ACCOUNT_LEN {
        return None;
    }
    PublicKey::from_slice(&info.data[..32]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{AccountInfo, OfflineNetwork, StaticNetwork};
    use crate::transaction::AccountMeta;
    use crate::types::{Network, TokenMeta};
    use std::collections::BTreeMap;

    fn meta(byte: u8) -> AccountMeta {
        AccountMeta {
            pubkey: PublicKey::new([byte; 32]),
            is_signer: false,
            is_writable: true,
        }
    }

    fn transfer_ix(amount: u64) -> Instruction {
        let mut data = vec![TRANSFER];
        data.extend_from_slice(&amount.to_le_bytes());
        Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![meta(1), meta(2), meta(3)],
            data,
        }
    }

    fn usdc() -> TokenMeta {
        TokenMeta {
            name: "USD Coin".into(),
            symbol: "USDC".into(),
            decimals: 6,
            logo_uri: None,
        }
    }

    #[test]
    fn test_program_id_base58() {
        assert_eq!(
            PROGRAM_ID.to_string(),
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        );
    }

    #[tokio::test]
    async fn test_transfer_without_metadata() {
        let decoded = TokenDecoder.decode(&transfer_ix(250)).unwrap();
        let tokens = BTreeMap::new();
        let ctx = DecorateContext {
            network: Network::MainnetBeta,
            tokens: &tokens,
            client: &OfflineNetwork,
        };
        let decorated = TokenDecoder.decorate(decoded.clone(), &ctx).await;
        assert_eq!(decorated, decoded);

        let text = TokenDecoder.render(&decorated).unwrap();
        assert!(text.starts_with("**Transfer** 250 tokens from"));
    }

    #[tokio::test]
    async fn test_transfer_decorated_from_registry() {
        let mint = PublicKey::new([9u8; 32]);
        let network = StaticNetwork::new();
        let mut data = vec![0u8; TOKEN_ACCOUNT_LEN];
        data[..32].copy_from_slice(mint.as_bytes());
        network.insert_account(
            PublicKey::new([1u8; 32]),
            AccountInfo {
                owner: PROGRAM_ID,
                lamports: 2_039_280,
                data,
                executable: false,
            },
        );

        let mut tokens = BTreeMap::new();
        tokens.insert(mint, usdc());
        let ctx = DecorateContext {
            network: Network::MainnetBeta,
            tokens: &tokens,
            client: &network,
        };

        let decoded = TokenDecoder.decode(&transfer_ix(1_250_000)).unwrap();
        let decorated = TokenDecoder.decorate(decoded, &ctx).await;
        assert_eq!(decorated.str("uiAmount"), Some("1.25"));
        assert_eq!(decorated.str("symbol"), Some("USDC"));
        assert!(TokenDecoder.render(&decorated).unwrap().contains("1.25 USDC"));
    }

    #[tokio::test]
    async fn test_transfer_checked_uses_own_decimals() {
        let mut data = vec![TRANSFER_CHECKED];
        data.extend_from_slice(&5_000u64.to_le_bytes());
        data.push(3);
        let ix = Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![meta(1), meta(4), meta(2), meta(3)],
            data,
        };

        let tokens = BTreeMap::new();
        let ctx = DecorateContext {
            network: Network::Devnet,
            tokens: &tokens,
            client: &OfflineNetwork,
        };
        let decorated = TokenDecoder
            .decorate(TokenDecoder.decode(&ix).unwrap(), &ctx)
            .await;
        assert_eq!(decorated.str("uiAmount"), Some("5"));
        assert!(decorated.str("symbol").is_none());
    }

    #[test]
    fn test_set_authority_to_none() {
        let ix = Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![meta(1), meta(2)],
            data: vec![SET_AUTHORITY, 0, 0],
        };
        let decoded = TokenDecoder.decode(&ix).unwrap();
        assert_eq!(decoded.str("authorityType"), Some("mint"));
        assert!(TokenDecoder.render(&decoded).unwrap().starts_with("**Remove mint authority**"));
    }

    #[test]
    fn test_initialize_mint_with_freeze_authority() {
        let mut data = vec![INITIALIZE_MINT, 6];
        data.extend_from_slice(&[5u8; 32]);
        data.push(1);
        data.extend_from_slice(&[6u8; 32]);
        let ix = Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![meta(1), meta(7)],
            data,
        };
        let decoded = TokenDecoder.decode(&ix).unwrap();
        assert_eq!(decoded.pubkey("freezeAuthority"), Some(PublicKey::new([6u8; 32])));
    }

    #[test]
    fn test_errors() {
        let ix = Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![],
            data: vec![200],
        };
        assert!(matches!(
            TokenDecoder.decode(&ix),
            Err(WalletError::UnsupportedInstruction { tag: 200, .. })
        ));

        let ix = Instruction {
            program_id: PROGRAM_ID,
            accounts: vec![meta(1), meta(2), meta(3)],
            data: vec![TRANSFER, 1, 2],
        };
        assert!(matches!(
            TokenDecoder.decode(&ix),
            Err(WalletError::UndecodableInstruction(_))
        ));
    }
}
