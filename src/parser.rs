// src/parser.rs
use crate::models::{TokenDescriptor, TokenId, TransferType};
use thiserror::Error;

const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

const LOKAD_ID: &[u8] = b"SLP\0";
/// Fungible, NFT group and NFT child token types.
const SUPPORTED_TOKEN_TYPES: [u16; 3] = [0x01, 0x41, 0x81];
const MAX_SEND_OUTPUTS: usize = 19;

/// Reasons a script is not a usable SLP descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlpParseError {
    #[error("script is not valid hex")]
    InvalidHex,
    #[error("output 0 is not an OP_RETURN")]
    NotOpReturn,
    #[error("script ended inside a push")]
    Truncated,
    #[error("non-push opcode 0x{0:02x} in OP_RETURN")]
    UnexpectedOpcode(u8),
    #[error("missing SLP lokad id")]
    NotSlp,
    #[error("unsupported token type {0}")]
    UnsupportedTokenType(u16),
    #[error("unknown transaction type")]
    UnknownTxType,
    #[error("malformed {0} message")]
    Malformed(&'static str),
}

/// Split an OP_RETURN script into its data pushes.
fn read_pushes(script: &[u8]) -> Result<Vec<&[u8]>, SlpParseError> {
    let (first, mut rest) = script.split_first().ok_or(SlpParseError::NotOpReturn)?;
    if *first != OP_RETURN {
        return Err(SlpParseError::NotOpReturn);
    }

    let mut pushes = Vec::new();
    while let Some((&op, tail)) = rest.split_first() {
        let (len, tail) = match op {
            0x00 => (0, tail),
            0x01..=0x4b => (op as usize, tail),
            OP_PUSHDATA1 => {
                let (n, t) = take(tail, 1)?;
                (n[0] as usize, t)
            }
            OP_PUSHDATA2 => {
                let (n, t) = take(tail, 2)?;
                (u16::from_le_bytes([n[0], n[1]]) as usize, t)
            }
            OP_PUSHDATA4 => {
                let (n, t) = take(tail, 4)?;
                (u32::from_le_bytes([n[0], n[1], n[2], n[3]]) as usize, t)
            }
            other => return Err(SlpParseError::UnexpectedOpcode(other)),
        };
        let (data, t) = take(tail, len)?;
        pushes.push(data);
        rest = t;
    }
    Ok(pushes)
}

fn take(buf: &[u8], n: usize) -> Result<(&[u8], &[u8]), SlpParseError> {
    if buf.len() < n {
        return Err(SlpParseError::Truncated);
    }
    Ok(buf.split_at(n))
}

fn be_u64(chunk: &[u8], what: &'static str) -> Result<u64, SlpParseError> {
    let bytes: [u8; 8] = chunk.try_into().map_err(|_| SlpParseError::Malformed(what))?;
    Ok(u64::from_be_bytes(bytes))
}

fn token_id(chunk: &[u8], what: &'static str) -> Result<TokenId, SlpParseError> {
    let bytes: [u8; 32] = chunk.try_into().map_err(|_| SlpParseError::Malformed(what))?;
    Ok(TokenId::from_bytes(bytes))
}

/// Decode the SLP metadata carried by output 0 of transaction `txid`.
///
/// GENESIS transactions have no token id in the script; the token id is the
/// transaction id itself.
pub fn decode_op_return(txid: &str, script_hex: &str) -> Result<TokenDescriptor, SlpParseError> {
    let script = hex::decode(script_hex).map_err(|_| SlpParseError::InvalidHex)?;
    let pushes = read_pushes(&script)?;

    if pushes.first().copied() != Some(LOKAD_ID) {
        return Err(SlpParseError::NotSlp);
    }

    let token_type = match pushes.get(1).copied() {
        Some([a]) => *a as u16,
        Some([a, b]) => u16::from_be_bytes([*a, *b]),
        _ => return Err(SlpParseError::Malformed("token type")),
    };
    if !SUPPORTED_TOKEN_TYPES.contains(&token_type) {
        return Err(SlpParseError::UnsupportedTokenType(token_type));
    }

    match pushes.get(2).copied() {
        Some(b"GENESIS") => {
            // ticker, name, document uri, document hash, decimals, baton vout, qty
            if pushes.len() != 10 {
                return Err(SlpParseError::Malformed("GENESIS"));
            }
            if !matches!(pushes[6].len(), 0 | 32) || pushes[7].len() != 1 || pushes[7][0] > 9 {
                return Err(SlpParseError::Malformed("GENESIS"));
            }
            let id = token_id(
                &hex::decode(txid).map_err(|_| SlpParseError::Malformed("GENESIS"))?,
                "GENESIS",
            )?;
            Ok(TokenDescriptor {
                token_id: id,
                token_type,
                transfer_type: TransferType::Genesis,
                amounts: vec![be_u64(pushes[9], "GENESIS")?],
            })
        }
        Some(b"MINT") => {
            if pushes.len() != 6 || pushes[4].len() > 1 {
                return Err(SlpParseError::Malformed("MINT"));
            }
            Ok(TokenDescriptor {
                token_id: token_id(pushes[3], "MINT")?,
                token_type,
                transfer_type: TransferType::Mint,
                amounts: vec![be_u64(pushes[5], "MINT")?],
            })
        }
        Some(b"SEND") => {
            let quantities = pushes.get(4..).unwrap_or_default();
            if quantities.is_empty() || quantities.len() > MAX_SEND_OUTPUTS {
                return Err(SlpParseError::Malformed("SEND"));
            }
            let amounts = quantities
                .iter()
                .map(|q| be_u64(q, "SEND"))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TokenDescriptor {
                token_id: token_id(pushes[3], "SEND")?,
                token_type,
                transfer_type: TransferType::Send,
                amounts,
            })
        }
        _ => Err(SlpParseError::UnknownTxType),
    }
}
