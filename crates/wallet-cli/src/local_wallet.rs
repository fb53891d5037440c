//! Development stand-in for the hosted embedded-wallet provider: a single
//! wallet whose key lives in process memory.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use chain_eth::authorization::{AuthorizationRequest, AuthorizationSignature};
use chain_eth::signing::{LocalKeySigner, RecoverableSignature};
use chain_eth::transaction::{Eip1559Transaction, SignedTransaction};
use smart_wallet::services::{AuthProvider, EmbeddedWallet};
use smart_wallet::WalletError;
use tracing::debug;

#[derive(Debug)]
pub struct LocalEmbeddedWallet {
    signer: LocalKeySigner,
    chain_id: AtomicU64,
}

impl LocalEmbeddedWallet {
    pub fn from_hex(private_key: &str, chain_id: u64) -> Result<Self, WalletError> {
        let signer = LocalKeySigner::from_hex(private_key)?;
        Ok(Self {
            signer,
            chain_id: AtomicU64::new(chain_id),
        })
    }
}

#[async_trait]
impl EmbeddedWallet for LocalEmbeddedWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn is_embedded(&self) -> bool {
        true
    }

    async fn chain_id(&self) -> Result<String, WalletError> {
        Ok(format!("eip155:{}", self.chain_id.load(Ordering::SeqCst)))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        self.chain_id.store(chain_id, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, WalletError> {
        Ok(self.signer.sign_message(message)?)
    }

    async fn sign_transaction(
        &self,
        tx: &Eip1559Transaction,
    ) -> Result<SignedTransaction, WalletError> {
        Ok(self.signer.sign_transaction(tx)?)
    }

    async fn sign_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationSignature, WalletError> {
        let signed = self.signer.sign_authorization(request)?;
        debug!(delegate = %signed.address, nonce = signed.nonce, "signed authorization");
        Ok(AuthorizationSignature {
            chain_id: Some(signed.chain_id),
            address: Some(signed.address),
            nonce: Some(signed.nonce),
            y_parity: signed.y_parity,
            r: signed.r,
            s: signed.s,
        })
    }
}

/// Auth provider that "logs in" to the one local wallet.
pub struct LocalAuthProvider {
    wallet: Arc<LocalEmbeddedWallet>,
    logged_in: AtomicBool,
}

impl LocalAuthProvider {
    pub fn new(wallet: LocalEmbeddedWallet) -> Self {
        Self {
            wallet: Arc::new(wallet),
            logged_in: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn login(&self) -> Result<(), WalletError> {
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) -> Result<(), WalletError> {
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn list_wallets(&self) -> Result<Vec<Arc<dyn EmbeddedWallet>>, WalletError> {
        if self.logged_in.load(Ordering::SeqCst) {
            Ok(vec![self.wallet.clone()])
        } else {
            Ok(Vec::new())
        }
    }
}
