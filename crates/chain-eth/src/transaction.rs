use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, RlpEncodable};
use sha3::{Digest, Keccak256};

/// EIP-1559 transaction type byte.
const TX_TYPE: u8 = 0x02;

/// An unsigned EIP-1559 (type 2) transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

/// A signed EIP-1559 transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// `0x02 || rlp(signed fields)`.
    pub raw: Bytes,
    /// Keccak-256 of `raw`.
    pub hash: B256,
}

/// An EIP-2930 access list entry. Always empty in transactions built here.
#[derive(Debug, Clone, RlpEncodable)]
struct AccessListItem {
    address: Address,
    storage_keys: Vec<B256>,
}

#[derive(RlpEncodable)]
struct UnsignedFields {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    input: Bytes,
    access_list: Vec<AccessListItem>,
}

#[derive(RlpEncodable)]
struct SignedFields {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    input: Bytes,
    access_list: Vec<AccessListItem>,
    y_parity: bool,
    r: U256,
    s: U256,
}

impl Eip1559Transaction {
    /// Builds a plain value transfer with empty calldata.
    pub fn transfer(
        chain_id: u64,
        nonce: u64,
        to: Address,
        value: U256,
        max_priority_fee_per_gas: u128,
        max_fee_per_gas: u128,
    ) -> Self {
        Self {
            chain_id,
            nonce,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit: 21_000,
            to,
            value,
            input: Bytes::new(),
        }
    }

    /// Encodes the signing payload `0x02 || rlp(unsigned fields)`.
    pub fn encode_unsigned(&self) -> Vec<u8> {
        let fields = UnsignedFields {
            chain_id: self.chain_id,
            nonce: self.nonce,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            input: self.input.clone(),
            access_list: Vec::new(),
        };
        typed(&fields)
    }

    /// Keccak-256 of [`encode_unsigned`](Self::encode_unsigned).
    pub fn signing_hash(&self) -> B256 {
        B256::from_slice(&Keccak256::digest(self.encode_unsigned()))
    }

    /// Attaches a signature over [`signing_hash`](Self::signing_hash).
    pub fn into_signed(self, y_parity: bool, r: U256, s: U256) -> SignedTransaction {
        let fields = SignedFields {
            chain_id: self.chain_id,
            nonce: self.nonce,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            input: self.input,
            access_list: Vec::new(),
            y_parity,
            r,
            s,
        };
        let raw = typed(&fields);
        let hash = B256::from_slice(&Keccak256::digest(&raw));
        SignedTransaction {
            raw: raw.into(),
            hash,
        }
    }
}

fn typed<T: Encodable>(fields: &T) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + fields.length());
    out.push(TX_TYPE);
    fields.encode(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(nonce: u64, chain_id: u64) -> Eip1559Transaction {
        Eip1559Transaction::transfer(
            chain_id,
            nonce,
            Address::with_last_byte(0xad),
            U256::from(1_000_000_000_000_000_000u128),
            1_000_000_000,
            50_000_000_000,
        )
    }

    #[test]
    fn transfer_defaults() {
        let tx = transfer(0, 8453);
        assert_eq!(tx.gas_limit, 21_000);
        assert!(tx.input.is_empty());
    }

    #[test]
    fn unsigned_payload_starts_with_type_byte() {
        let encoded = transfer(0, 8453).encode_unsigned();
        assert_eq!(encoded[0], 0x02);
        assert!(encoded.len() > 1);
    }

    #[test]
    fn signing_hash_is_deterministic() {
        assert_eq!(transfer(42, 8453).signing_hash(), transfer(42, 8453).signing_hash());
    }

    #[test]
    fn signing_hash_differs_by_nonce_and_chain() {
        let base = transfer(0, 8453).signing_hash();
        assert_ne!(base, transfer(1, 8453).signing_hash());
        assert_ne!(base, transfer(0, 84532).signing_hash());
    }

    #[test]
    fn signed_encoding_hashes_raw_bytes() {
        let signed = transfer(0, 8453).into_signed(true, U256::from(1u64), U256::from(2u64));
        assert_eq!(signed.raw[0], 0x02);
        assert_eq!(signed.hash, B256::from_slice(&Keccak256::digest(&signed.raw)));
    }

    #[test]
    fn zero_value_encodes_as_empty_string() {
        let mut buf = Vec::new();
        U256::ZERO.encode(&mut buf);
        assert_eq!(buf, vec![0x80]);
    }
}
