//! Normalized signer over an embedded wallet.

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use chain_eth::authorization::{AuthorizationRequest, SignedAuthorization};
use chain_eth::signing::RecoverableSignature;
use chain_eth::transaction::{Eip1559Transaction, SignedTransaction};
use tracing::debug;

use crate::error::WalletError;
use crate::services::{
    CallSignature, EmbeddedWallet, PreparedCall, SignatureRequest, SignedPreparedCall,
};

/// Signing capabilities of the authenticated account.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    /// EIP-191 `personal_sign`.
    async fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, WalletError>;

    async fn sign_transaction(
        &self,
        tx: &Eip1559Transaction,
    ) -> Result<SignedTransaction, WalletError>;

    /// Signs an EIP-7702 authorization and returns it with every request
    /// field populated.
    async fn sign_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<SignedAuthorization, WalletError>;
}

/// [`Signer`] bridging an [`EmbeddedWallet`] handle.
pub struct SessionSigner {
    wallet: Arc<dyn EmbeddedWallet>,
}

impl SessionSigner {
    pub fn new(wallet: Arc<dyn EmbeddedWallet>) -> Self {
        Self { wallet }
    }
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("address", &self.wallet.address())
            .finish()
    }
}

#[async_trait]
impl Signer for SessionSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, WalletError> {
        self.wallet.sign_message(message).await
    }

    async fn sign_transaction(
        &self,
        tx: &Eip1559Transaction,
    ) -> Result<SignedTransaction, WalletError> {
        self.wallet.sign_transaction(tx).await
    }

    async fn sign_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<SignedAuthorization, WalletError> {
        let signature = self.wallet.sign_authorization(request).await?;
        Ok(request.merge(signature))
    }
}

/// Signs a prepared call according to its signature request.
///
/// An `array` call is signed element by element; its elements are leaves and
/// are not expanded further.
pub async fn sign_prepared_call(
    signer: &dyn Signer,
    call: &PreparedCall,
    chain_id: u64,
) -> Result<SignedPreparedCall, WalletError> {
    if !call.is_array() {
        return sign_leaf(signer, call, chain_id).await;
    }

    let elements = call.elements()?;
    let mut signed = Vec::with_capacity(elements.len());
    for element in &elements {
        if element.is_array() {
            return Err(WalletError::UnexpectedResponse(
                "nested array in prepared calls".into(),
            ));
        }
        signed.push(sign_leaf(signer, element, chain_id).await?);
    }
    debug!(elements = signed.len(), "signed prepared call array");

    let mut out = SignedPreparedCall::new(call, None);
    out.data = serde_json::to_value(signed)?;
    Ok(out)
}

async fn sign_leaf(
    signer: &dyn Signer,
    call: &PreparedCall,
    chain_id: u64,
) -> Result<SignedPreparedCall, WalletError> {
    let signature = match &call.signature_request {
        None => None,
        Some(SignatureRequest::PersonalSign { data, .. }) => {
            let sig = signer.sign_message(data.message_bytes()).await?;
            Some(CallSignature::secp256k1(sig.to_bytes()))
        }
        Some(SignatureRequest::Eip7702Auth { .. }) => {
            let request = call.authorization_request(chain_id)?;
            let signed = signer.sign_authorization(&request).await?;
            Some(CallSignature::secp256k1(signed.signature_bytes()))
        }
        Some(SignatureRequest::Unsupported) => {
            return Err(WalletError::UnexpectedResponse(format!(
                "unsupported signature request on {} call",
                call.kind
            )))
        }
    };
    Ok(SignedPreparedCall::new(call, signature))
}
