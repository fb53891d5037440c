//! Local secp256k1 signing.
//!
//! [`LocalKeySigner`] holds a private key in process memory. It backs the
//! development wallet and the test doubles; hosted embedded wallets sign on
//! the provider's side instead.

use alloy_primitives::{Address, B256, U256};
use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};
use zeroize::Zeroize;

use crate::address::verifying_key_to_address;
use crate::authorization::{AuthorizationRequest, SignedAuthorization};
use crate::error::EthError;
use crate::transaction::{Eip1559Transaction, SignedTransaction};

/// A recoverable ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: U256,
    pub s: U256,
    pub y_parity: bool,
}

impl RecoverableSignature {
    /// `r || s || v` with `v` = 27 or 28.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        out[32..64].copy_from_slice(&self.s.to_be_bytes::<32>());
        out[64] = 27 + u8::from(self.y_parity);
        out
    }
}

/// Hashes a message the EIP-191 `personal_sign` way:
/// `keccak256("\x19Ethereum Signed Message:\n" || len || message)`.
pub fn eip191_hash(message: &[u8]) -> B256 {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    B256::from_slice(&hasher.finalize())
}

/// A signer backed by an in-memory secp256k1 key.
pub struct LocalKeySigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalKeySigner {
    /// Creates a signer from raw key bytes.
    pub fn from_bytes(private_key: &[u8; 32]) -> Result<Self, EthError> {
        let mut key_bytes = *private_key;
        let key = SigningKey::from_bytes((&key_bytes).into())
            .map_err(|e| EthError::InvalidPrivateKey(e.to_string()));
        key_bytes.zeroize();
        let key = key?;

        let address = verifying_key_to_address(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Creates a signer from a hex key, with or without `0x`.
    pub fn from_hex(private_key: &str) -> Result<Self, EthError> {
        let trimmed = private_key.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut decoded = hex::decode(hex_part)
            .map_err(|_| EthError::InvalidPrivateKey("key is not valid hex".into()))?;
        if decoded.len() != 32 {
            let len = decoded.len();
            decoded.zeroize();
            return Err(EthError::InvalidPrivateKey(format!(
                "expected 32 bytes, got {len}"
            )));
        }

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        let signer = Self::from_bytes(&key_bytes);
        key_bytes.zeroize();
        signer
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Signs a 32-byte digest as-is.
    pub fn sign_hash(&self, hash: &B256) -> Result<RecoverableSignature, EthError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| EthError::SigningError(e.to_string()))?;

        Ok(RecoverableSignature {
            r: U256::from_be_slice(&signature.r().to_bytes()),
            s: U256::from_be_slice(&signature.s().to_bytes()),
            y_parity: recovery_id.is_y_odd(),
        })
    }

    /// EIP-191 `personal_sign`.
    pub fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, EthError> {
        self.sign_hash(&eip191_hash(message))
    }

    /// Signs an EIP-7702 authorization.
    pub fn sign_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<SignedAuthorization, EthError> {
        let signature = self.sign_hash(&request.signing_hash())?;
        Ok(SignedAuthorization {
            chain_id: request.chain_id,
            address: request.address,
            nonce: request.nonce,
            y_parity: u8::from(signature.y_parity),
            r: signature.r,
            s: signature.s,
        })
    }

    /// Signs an EIP-1559 transaction.
    pub fn sign_transaction(
        &self,
        tx: &Eip1559Transaction,
    ) -> Result<SignedTransaction, EthError> {
        let signature = self.sign_hash(&tx.signing_hash())?;
        Ok(tx
            .clone()
            .into_signed(signature.y_parity, signature.r, signature.s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    /// Well-known test private key (DO NOT use on mainnet).
    const TEST_PRIVKEY: [u8; 32] = {
        let mut key = [0u8; 32];
        key[31] = 1;
        key
    };

    fn signer() -> LocalKeySigner {
        LocalKeySigner::from_bytes(&TEST_PRIVKEY).unwrap()
    }

    fn recover(hash: &B256, sig: &RecoverableSignature) -> Address {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&sig.r.to_be_bytes::<32>());
        rs[32..].copy_from_slice(&sig.s.to_be_bytes::<32>());
        let signature = Signature::from_slice(&rs).unwrap();
        let recid = RecoveryId::new(sig.y_parity, false);
        let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recid).unwrap();
        verifying_key_to_address(&key)
    }

    #[test]
    fn address_of_key_one() {
        assert_eq!(
            signer().address().to_checksum(None),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn from_hex_matches_from_bytes() {
        let hex_key = format!("0x{}", hex::encode(TEST_PRIVKEY));
        assert_eq!(
            LocalKeySigner::from_hex(&hex_key).unwrap().address(),
            signer().address()
        );
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(LocalKeySigner::from_hex("0x1234").is_err());
        assert!(LocalKeySigner::from_hex("zz").is_err());
    }

    #[test]
    fn zero_key_is_rejected() {
        assert!(matches!(
            LocalKeySigner::from_bytes(&[0u8; 32]),
            Err(EthError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let debug = format!("{:?}", signer());
        assert!(debug.contains("address"));
        assert!(!debug.contains("key:"));
    }

    #[test]
    fn message_signature_recovers_signer() {
        let sig = signer().sign_message(b"hello").unwrap();
        assert_eq!(recover(&eip191_hash(b"hello"), &sig), signer().address());
        let bytes = sig.to_bytes();
        assert!(bytes[64] == 27 || bytes[64] == 28);
    }

    #[test]
    fn authorization_signature_recovers_signer() {
        let request = AuthorizationRequest {
            chain_id: 8453,
            address: Address::with_last_byte(0x69),
            nonce: 0,
        };
        let signed = signer().sign_authorization(&request).unwrap();
        assert_eq!(signed.request(), request);

        let sig = RecoverableSignature {
            r: signed.r,
            s: signed.s,
            y_parity: signed.y_parity == 1,
        };
        assert_eq!(recover(&request.signing_hash(), &sig), signer().address());
    }

    #[test]
    fn transaction_signature_recovers_signer() {
        let tx = Eip1559Transaction::transfer(
            8453,
            0,
            Address::with_last_byte(0xad),
            U256::from(1u64),
            1,
            2,
        );
        let signed = signer().sign_transaction(&tx).unwrap();
        assert_eq!(signed.raw[0], 0x02);
        assert_eq!(signed.hash.len(), 32);

        let sig = signer().sign_hash(&tx.signing_hash()).unwrap();
        assert_eq!(recover(&tx.signing_hash(), &sig), signer().address());
    }

    #[test]
    fn signing_is_deterministic() {
        let a = signer().sign_message(b"same").unwrap();
        let b = signer().sign_message(b"same").unwrap();
        assert_eq!(a, b);
    }
}
