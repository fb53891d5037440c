//! Wallet session adapter.
//!
//! Tracks whether a user is logged in, finds the embedded wallet among the
//! provider's wallets and hands out a normalized [`Signer`] for it. Every
//! login and logout bumps the session epoch so cached clients bound to an
//! earlier session can be told apart.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chain_eth::chains::{self, ChainDescriptor};
use tracing::{debug, info};

use crate::error::WalletError;
use crate::services::{AuthProvider, EmbeddedWallet};
use crate::signer::{SessionSigner, Signer};

pub struct WalletSession {
    auth: Arc<dyn AuthProvider>,
    epoch: AtomicU64,
    logged_in: AtomicBool,
}

impl WalletSession {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            auth,
            epoch: AtomicU64::new(0),
            logged_in: AtomicBool::new(false),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    pub async fn login(&self) -> Result<(), WalletError> {
        self.auth.login().await?;
        self.logged_in.store(true, Ordering::SeqCst);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(epoch, "logged in");
        Ok(())
    }

    /// Ends the session locally even if the provider call fails.
    pub async fn logout(&self) -> Result<(), WalletError> {
        self.logged_in.store(false, Ordering::SeqCst);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(epoch, "logged out");
        self.auth.logout().await
    }

    /// The first wallet the provider lists as embedded.
    pub async fn embedded_wallet(&self) -> Result<Arc<dyn EmbeddedWallet>, WalletError> {
        if !self.is_logged_in() {
            return Err(WalletError::NoWallet("not logged in".into()));
        }
        let wallets = self.auth.list_wallets().await?;
        wallets
            .into_iter()
            .find(|w| w.is_embedded())
            .ok_or_else(|| {
                WalletError::NoWallet("no embedded wallet found for the logged-in user".into())
            })
    }

    pub async fn current_signer(&self) -> Result<Arc<dyn Signer>, WalletError> {
        let wallet = self.embedded_wallet().await?;
        debug!(address = %wallet.address(), "resolved signer");
        Ok(Arc::new(SessionSigner::new(wallet)))
    }

    /// The embedded wallet's chain, resolved through the registry.
    pub async fn active_chain(&self) -> Result<&'static ChainDescriptor, WalletError> {
        let wallet = self.embedded_wallet().await?;
        let raw = wallet.chain_id().await?;
        Ok(chains::resolve_str(&raw)?)
    }

    /// Switches the embedded wallet to a supported chain. Unknown ids are
    /// rejected before the wallet is asked.
    pub async fn switch_chain(
        &self,
        chain_id: u64,
    ) -> Result<&'static ChainDescriptor, WalletError> {
        let chain = chains::resolve(chain_id)?;
        let wallet = self.embedded_wallet().await?;
        wallet.switch_chain(chain.id).await?;
        info!(chain_id = chain.id, chain = chain.name, "switched chain");
        Ok(chain)
    }
}
