//! Legacy (EIP-155 replay-protected) transactions.

use crate::error::ChainError;
use crate::keccak256;
use crate::rlp::{encode_bytes, encode_list, encode_uint, encode_uint_bytes};
use crate::signer::{Address, TransactionSigner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn common_fields(&self) -> Vec<Vec<u8>> {
        vec![
            encode_uint(self.nonce as u128),
            encode_uint(self.gas_price),
            encode_uint(self.gas_limit as u128),
            encode_bytes(&self.to.0),
            encode_uint(self.value),
            encode_bytes(&self.data),
        ]
    }

    /// RLP payload hashed for signing: the fields plus `chainId, 0, 0`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut fields = self.common_fields();
        fields.push(encode_uint(self.chain_id as u128));
        fields.push(encode_uint(0));
        fields.push(encode_uint(0));
        encode_list(&fields)
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.signing_payload())
    }

    /// Sign and return the raw transaction bytes with their hash.
    pub fn sign(&self, signer: &dyn TransactionSigner) -> Result<SignedTransaction, ChainError> {
        let signature = signer.sign_hash(&self.signing_hash())?;
        let v = signature.recovery_id as u128 + 35 + 2 * self.chain_id as u128;

        let mut fields = self.common_fields();
        fields.push(encode_uint(v));
        fields.push(encode_uint_bytes(&signature.r));
        fields.push(encode_uint_bytes(&signature.s));

        let raw = encode_list(&fields);
        let hash = keccak256(&raw);
        Ok(SignedTransaction { raw, hash })
    }
}

#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: [u8; 32],
}
