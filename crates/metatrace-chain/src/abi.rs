//! Contract ABI encoding for the metadata registry and NFT contracts.
//!
//! Only the shapes those contracts need are supported: `uint256`, `address`
//! and a single trailing dynamic `string`.

use crate::error::ChainError;
use crate::keccak256;
use crate::signer::Address;

pub const STORE_METADATA_SIG: &str = "storeMetadata(uint256,string)";
pub const GET_METADATA_SIG: &str = "getMetadata(uint256)";
pub const MINT_SIG: &str = "mint(address,string)";

const WORD: usize = 32;

/// First four bytes of the Keccak-256 hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Calldata for `storeMetadata(tokenId, ipfsHash)`.
pub fn encode_store_metadata(token_id: u64, ipfs_hash: &str) -> Vec<u8> {
    let mut data = selector(STORE_METADATA_SIG).to_vec();
    data.extend_from_slice(&uint_word(token_id as u128));
    data.extend_from_slice(&uint_word(2 * WORD as u128));
    data.extend_from_slice(&string_tail(ipfs_hash));
    data
}

/// Calldata for `getMetadata(tokenId)`.
pub fn encode_get_metadata(token_id: u64) -> Vec<u8> {
    let mut data = selector(GET_METADATA_SIG).to_vec();
    data.extend_from_slice(&uint_word(token_id as u128));
    data
}

/// Calldata for `mint(to, tokenURI)`.
pub fn encode_mint(to: &Address, token_uri: &str) -> Vec<u8> {
    let mut data = selector(MINT_SIG).to_vec();
    data.extend_from_slice(&address_word(to));
    data.extend_from_slice(&uint_word(2 * WORD as u128));
    data.extend_from_slice(&string_tail(token_uri));
    data
}

/// Decode an ABI-encoded return value consisting of a single `string`.
pub fn decode_string(data: &[u8]) -> Result<String, ChainError> {
    let offset = read_usize(data, 0)?;
    let len = read_usize(data, offset)?;
    let start = offset
        .checked_add(WORD)
        .ok_or_else(|| ChainError::Decode("string offset overflow".into()))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| ChainError::Decode("string length overflow".into()))?;
    let bytes = data
        .get(start..end)
        .ok_or_else(|| ChainError::Decode("string exceeds return data".into()))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| ChainError::Decode(e.to_string()))
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&address.0);
    word
}

fn string_tail(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut tail = Vec::with_capacity(WORD + padded);
    tail.extend_from_slice(&uint_word(bytes.len() as u128));
    tail.extend_from_slice(bytes);
    tail.resize(WORD + padded, 0);
    tail
}

fn read_usize(data: &[u8], at: usize) -> Result<usize, ChainError> {
    let word = data
        .get(at..at.saturating_add(WORD))
        .filter(|w| w.len() == WORD)
        .ok_or_else(|| ChainError::Decode(format!("no word at offset {at}")))?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("value does not fit in usize".into()));
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(low)).map_err(|e| ChainError::Decode(e.to_string()))
}
