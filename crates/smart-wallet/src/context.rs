use std::sync::Arc;

use chain_eth::chains::ChainDescriptor;
use tracing::{info, warn};

use crate::balance::{BalanceWatcher, Refresh};
use crate::client::{SmartWalletClient, SmartWalletClientCache};
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::services::{AuthProvider, ChainReader, WalletApiConnector};
use crate::session::WalletSession;
use crate::swap::SwapOrchestrator;
use crate::transaction::TransactionOrchestrator;

/// Owns one wallet session and everything bound to it.
///
/// Login, logout and chain switches go through here so the client cache and
/// the orchestrators never outlive the session or chain they were built for.
pub struct WalletContext {
    config: Arc<WalletConfig>,
    session: Arc<WalletSession>,
    cache: Arc<SmartWalletClientCache>,
    transactions: TransactionOrchestrator,
    swaps: SwapOrchestrator,
    balances: BalanceWatcher,
}

impl WalletContext {
    pub fn new(
        config: WalletConfig,
        auth: Arc<dyn AuthProvider>,
        connector: Arc<dyn WalletApiConnector>,
        reader: Arc<dyn ChainReader>,
    ) -> Self {
        let config = Arc::new(config);
        let session = Arc::new(WalletSession::new(auth));
        let cache = Arc::new(SmartWalletClientCache::new(config.clone(), connector));
        Self {
            transactions: TransactionOrchestrator::new(
                session.clone(),
                cache.clone(),
                config.clone(),
            ),
            swaps: SwapOrchestrator::new(session.clone(), cache.clone(), config.clone()),
            balances: BalanceWatcher::new(reader),
            config,
            session,
            cache,
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn session(&self) -> &WalletSession {
        &self.session
    }

    pub fn transactions(&self) -> &TransactionOrchestrator {
        &self.transactions
    }

    pub fn swaps(&self) -> &SwapOrchestrator {
        &self.swaps
    }

    pub fn balances(&self) -> &BalanceWatcher {
        &self.balances
    }

    pub async fn login(&self) -> Result<(), WalletError> {
        self.session.login().await
    }

    /// Ends the session and drops everything bound to it.
    pub async fn logout(&self) -> Result<(), WalletError> {
        let result = self.session.logout().await;
        self.cache.invalidate().await;
        if let Err(e) = self.transactions.reset() {
            warn!(error = %e, "transaction state kept on logout");
        }
        if let Err(e) = self.swaps.cancel() {
            warn!(error = %e, "swap state kept on logout");
        }
        self.balances.clear();
        result
    }

    /// Switches the embedded wallet, then drops the cached client and
    /// re-reads balances for the new chain. Reads still in flight for the
    /// old chain come back superseded.
    pub async fn switch_chain(
        &self,
        chain_id: u64,
    ) -> Result<&'static ChainDescriptor, WalletError> {
        let chain = self.session.switch_chain(chain_id).await?;
        self.cache.invalidate().await;
        self.balances.clear();
        info!(chain_id = chain.id, "client cache reset for new chain");
        if let Err(e) = self.refresh_balances().await {
            warn!(chain_id = chain.id, error = %e, "balance refresh after chain switch failed");
        }
        Ok(chain)
    }

    pub async fn active_chain(&self) -> Result<&'static ChainDescriptor, WalletError> {
        self.session.active_chain().await
    }

    pub async fn client(&self) -> Result<Arc<SmartWalletClient>, WalletError> {
        self.cache.get_client(&self.session).await
    }

    /// Refreshes balances for the current signer on the active chain.
    pub async fn refresh_balances(&self) -> Result<Refresh, WalletError> {
        let signer = self.session.current_signer().await?;
        let chain = self.session.active_chain().await?;
        self.balances.refresh(signer.address(), chain.id).await
    }
}
