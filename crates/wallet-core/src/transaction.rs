//! Legacy transaction message wire format.
//!
//! ```text
//! header:        num_required_signatures u8
//!                num_readonly_signed     u8
//!                num_readonly_unsigned   u8
//! account_keys:  compact-u16 len, [32]u8 * len
//! blockhash:     [32]u8
//! instructions:  compact-u16 len, each:
//!                  program_id_index u8
//!                  accounts         compact-u16 len, u8 * len
//!                  data             compact-u16 len, u8 * len
//! ```
//!
//! A first byte with the high bit set marks a versioned message, which is
//! rejected.

use crate::error::{Result, WalletError};
use crate::types::{PUBKEY_SIZE, PublicKey};
use serde::Serialize;

const VERSION_PREFIX_MASK: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

/// An account referenced by an instruction, with its resolved permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMeta {
    pub pubkey: PublicKey,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// An instruction with its account indices resolved against the key table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: PublicKey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Instruction as it appears on the wire, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A parsed legacy message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<PublicKey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Parse serialized message bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let first = reader.u8()?;
        if first & VERSION_PREFIX_MASK != 0 {
            return Err(WalletError::InvalidMessage(format!(
                "versioned messages are not supported (version {})",
                first & !VERSION_PREFIX_MASK
            )));
        }
        let header = MessageHeader {
            num_required_signatures: first,
            num_readonly_signed_accounts: reader.u8()?,
            num_readonly_unsigned_accounts: reader.u8()?,
        };

        let key_count = reader.compact_u16()? as usize;
        let mut account_keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            account_keys.push(PublicKey::new(reader.array::<PUBKEY_SIZE>()?));
        }

        let recent_blockhash = reader.array::<32>()?;

        let ix_count = reader.compact_u16()? as usize;
        let mut instructions = Vec::with_capacity(ix_count.min(bytes.len()));
        for _ in 0..ix_count {
            let program_id_index = reader.u8()?;
            let account_len = reader.compact_u16()? as usize;
            let accounts = reader.bytes(account_len)?.to_vec();
            let data_len = reader.compact_u16()? as usize;
            let data = reader.bytes(data_len)?.to_vec();
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }

        if !reader.is_empty() {
            return Err(WalletError::InvalidMessage(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }

        let message = Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        };
        message.check_header()?;
        Ok(message)
    }

    /// Parse a base58 encoded message.
    pub fn from_base58(encoded: &str) -> Result<Self> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| WalletError::InvalidMessage(format!("invalid base58: {}", e)))?;
        Self::parse(&bytes)
    }

    /// Serialize back to wire bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed_accounts,
            self.header.num_readonly_unsigned_accounts,
        ];
        encode_compact_u16(self.account_keys.len() as u16, &mut out);
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash);
        encode_compact_u16(self.instructions.len() as u16, &mut out);
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_compact_u16(ix.accounts.len() as u16, &mut out);
            out.extend_from_slice(&ix.accounts);
            encode_compact_u16(ix.data.len() as u16, &mut out);
            out.extend_from_slice(&ix.data);
        }
        out
    }

    /// Accounts whose signatures the message requires, in order.
    pub fn signers(&self) -> &[PublicKey] {
        let count = (self.header.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..count]
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < self.header.num_required_signatures as usize
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let signed = self.header.num_required_signatures as usize;
        if index < signed {
            index < signed.saturating_sub(self.header.num_readonly_signed_accounts as usize)
        } else {
            let unsigned_writable = self
                .account_keys
                .len()
                .saturating_sub(signed)
                .saturating_sub(self.header.num_readonly_unsigned_accounts as usize);
            index - signed < unsigned_writable
        }
    }

    /// Resolve instruction `index` against the key table.
    ///
    /// Out of range indices are reported per instruction so callers can keep
    /// going with the rest of the message.
    pub fn instruction(&self, index: usize) -> Result<Instruction> {
        let compiled = self.instructions.get(index).ok_or_else(|| {
            WalletError::InvalidMessage(format!("no instruction at index {}", index))
        })?;
        let program_id = self.key(compiled.program_id_index)?;
        let accounts = compiled
            .accounts
            .iter()
            .map(|&i| {
                Ok(AccountMeta {
                    pubkey: self.key(i)?,
                    is_signer: self.is_signer(i as usize),
                    is_writable: self.is_writable(i as usize),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Instruction {
            program_id,
            accounts,
            data: compiled.data.clone(),
        })
    }

    /// Program id of instruction `index`, if its index is in range.
    pub fn program_id(&self, index: usize) -> Option<PublicKey> {
        let compiled = self.instructions.get(index)?;
        self.account_keys
            .get(compiled.program_id_index as usize)
            .copied()
    }

    fn key(&self, index: u8) -> Result<PublicKey> {
        self.account_keys.get(index as usize).copied().ok_or_else(|| {
            WalletError::InvalidMessage(format!(
                "account index {} out of range ({} keys)",
                index,
                self.account_keys.len()
            ))
        })
    }

    fn check_header(&self) -> Result<()> {
        let signed = self.header.num_required_signatures as usize;
        if signed > self.account_keys.len() {
            return Err(WalletError::InvalidMessage(format!(
                "{} required signatures but only {} keys",
                signed,
                self.account_keys.len()
            )));
        }
        if self.header.num_readonly_signed_accounts as usize > signed {
            return Err(WalletError::InvalidMessage(
                "more readonly signed accounts than signers".to_string(),
            ));
        }
        if self.header.num_readonly_unsigned_accounts as usize > self.account_keys.len() - signed {
            return Err(WalletError::InvalidMessage(
                "more readonly unsigned accounts than unsigned keys".to_string(),
            ));
        }
        Ok(())
    }
}

/// Append `value` as a compact-u16 (1 to 3 bytes, 7 bits per byte).
pub fn encode_compact_u16(mut value: u16, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Bounds checked little-endian cursor.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(WalletError::InvalidMessage(format!(
                "unexpected end of data at offset {}: need {} bytes, have {}",
                self.pos,
                len,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array::<4>()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array::<8>()?))
    }

    pub(crate) fn pubkey(&mut self) -> Result<PublicKey> {
        Ok(PublicKey::new(self.array::<PUBKEY_SIZE>()?))
    }

    /// Read a compact-u16, rejecting overlong and overflowing encodings.
    pub(crate) fn compact_u16(&mut self) -> Result<u16> {
        let mut value: u32 = 0;
        for i in 0..3 {
            let byte = self.u8()?;
            if i > 0 && byte == 0 {
                return Err(WalletError::InvalidMessage(
                    "non-canonical compact-u16".to_string(),
                ));
            }
            value |= ((byte & 0x7f) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return u16::try_from(value).map_err(|_| {
                    WalletError::InvalidMessage("compact-u16 overflow".to_string())
                });
            }
            if i == 2 {
                break;
            }
        }
        Err(WalletError::InvalidMessage(
            "compact-u16 longer than 3 bytes".to_string(),
        ))
    }
}
