//! EIP-7702 set-code authorizations.
//!
//! An authorization delegates an EOA's code to `address` on `chain_id` at the
//! account's current `nonce`. The signing payload is
//! `keccak256(0x05 || rlp([chain_id, address, nonce]))`.

use alloy_primitives::{Address, B256, U256};
use alloy_rlp::{Encodable, RlpEncodable};
use sha3::{Digest, Keccak256};

/// EIP-7702 signing domain prefix.
const MAGIC: u8 = 0x05;

/// An unsigned authorization as requested by the wallet service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub chain_id: u64,
    /// Delegate contract the account's code will point to.
    pub address: Address,
    pub nonce: u64,
}

/// What a wallet provider hands back after signing an authorization.
///
/// Providers differ in how much of the request they echo back, so every
/// request field is optional here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationSignature {
    pub chain_id: Option<u64>,
    pub address: Option<Address>,
    pub nonce: Option<u64>,
    pub y_parity: u8,
    pub r: U256,
    pub s: U256,
}

/// A complete signed authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedAuthorization {
    pub chain_id: u64,
    pub address: Address,
    pub nonce: u64,
    pub y_parity: u8,
    pub r: U256,
    pub s: U256,
}

#[derive(RlpEncodable)]
struct AuthorizationFields {
    chain_id: u64,
    address: Address,
    nonce: u64,
}

impl AuthorizationRequest {
    /// The 32-byte digest a signer must sign.
    pub fn signing_hash(&self) -> B256 {
        let fields = AuthorizationFields {
            chain_id: self.chain_id,
            address: self.address,
            nonce: self.nonce,
        };
        let mut payload = Vec::with_capacity(1 + fields.length());
        payload.push(MAGIC);
        fields.encode(&mut payload);
        B256::from_slice(&Keccak256::digest(&payload))
    }

    /// Forward-fills a provider signature with this request's fields.
    ///
    /// Fields present in `signature` win; fields it omits are taken from the
    /// request, so nonce and chain id are never lost.
    pub fn merge(&self, signature: AuthorizationSignature) -> SignedAuthorization {
        SignedAuthorization {
            chain_id: signature.chain_id.unwrap_or(self.chain_id),
            address: signature.address.unwrap_or(self.address),
            nonce: signature.nonce.unwrap_or(self.nonce),
            y_parity: signature.y_parity,
            r: signature.r,
            s: signature.s,
        }
    }
}

impl SignedAuthorization {
    /// The request this authorization answers.
    pub fn request(&self) -> AuthorizationRequest {
        AuthorizationRequest {
            chain_id: self.chain_id,
            address: self.address,
            nonce: self.nonce,
        }
    }

    /// `r || s || v` with `v = 27 + y_parity`.
    pub fn signature_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        out[32..64].copy_from_slice(&self.s.to_be_bytes::<32>());
        out[64] = 27 + self.y_parity;
        out
    }
}
