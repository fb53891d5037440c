//! Smart wallet client and its memoizing cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U64};
use chain_eth::chains::ChainDescriptor;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::services::{
    BatchId, Call, Capabilities, PrepareCallsRequest, PreparedCall, QuoteRequest, QuoteResponse,
    WalletApi, WalletApiConnector,
};
use crate::session::WalletSession;
use crate::signer::{sign_prepared_call, Signer};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// An account-abstraction client bound to one chain, signer and
/// sponsorship policy.
pub struct SmartWalletClient {
    serial: u64,
    chain: &'static ChainDescriptor,
    signer: Arc<dyn Signer>,
    policy_id: Option<String>,
    api: Arc<dyn WalletApi>,
    status_timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for SmartWalletClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartWalletClient")
            .field("serial", &self.serial)
            .field("chain_id", &self.chain.id)
            .field("account", &self.signer.address())
            .field("policy_id", &self.policy_id)
            .finish_non_exhaustive()
    }
}

impl SmartWalletClient {
    pub fn new(
        chain: &'static ChainDescriptor,
        signer: Arc<dyn Signer>,
        api: Arc<dyn WalletApi>,
        config: &WalletConfig,
    ) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            chain,
            signer,
            policy_id: config.policy_id().map(str::to_string),
            api,
            status_timeout: config.status_timeout,
            poll_interval: config.poll_interval,
        }
    }

    /// Process-unique construction number.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn chain(&self) -> &'static ChainDescriptor {
        self.chain
    }

    pub fn account(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    pub fn policy_id(&self) -> Option<&str> {
        self.policy_id.as_deref()
    }

    /// Sponsorship capability, if requested and a policy is bound.
    pub fn capabilities(&self, sponsored: bool) -> Option<Capabilities> {
        if sponsored {
            Capabilities::sponsored_by(self.policy_id())
        } else {
            None
        }
    }

    /// Prepares, signs and sends a batch of calls.
    pub async fn send_calls(
        &self,
        calls: Vec<Call>,
        sponsored: bool,
    ) -> Result<BatchId, WalletError> {
        let request = PrepareCallsRequest {
            calls,
            from: self.account(),
            chain_id: U64::from(self.chain.id),
            capabilities: self.capabilities(sponsored),
        };
        debug!(
            calls = request.calls.len(),
            sponsored = request.capabilities.is_some(),
            "preparing calls"
        );
        let prepared = self.api.prepare_calls(&request).await?;
        self.send_prepared(&prepared).await
    }

    /// Signs and sends an already prepared call unchanged.
    pub async fn send_prepared(&self, prepared: &PreparedCall) -> Result<BatchId, WalletError> {
        let signed = sign_prepared_call(self.signer.as_ref(), prepared, self.chain.id).await?;
        let id = self.api.send_prepared_calls(&signed).await?;
        info!(
            batch_id = %id,
            kind = %prepared.kind,
            chain_id = self.chain.id,
            "sent prepared calls"
        );
        Ok(id)
    }

    pub async fn request_quote(
        &self,
        request: &QuoteRequest,
    ) -> Result<QuoteResponse, WalletError> {
        self.api.request_quote(request).await
    }

    /// Polls the batch status until the first receipt is available, bounded
    /// by the configured status timeout.
    pub async fn wait_for_calls_status(&self, id: &BatchId) -> Result<B256, WalletError> {
        let poll = async {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let status = self.api.get_calls_status(id).await?;
                if status.is_failed() {
                    return Err(WalletError::CallsFailed(status.status));
                }
                if !status.is_pending() {
                    return status.first_transaction_hash().ok_or_else(|| {
                        WalletError::UnexpectedResponse(format!(
                            "status {} carried no receipt",
                            status.status
                        ))
                    });
                }
                debug!(batch_id = %id, attempt, status = status.status, "calls pending");
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.status_timeout, poll)
            .await
            .map_err(|_| WalletError::Timeout(self.status_timeout))?
    }
}

/// (session epoch, signer address, chain id)
type ClientKey = (u64, Address, u64);

type ClientSlot = Option<(ClientKey, Arc<OnceCell<Arc<SmartWalletClient>>>)>;

/// Memoizes the [`SmartWalletClient`] for the current session, signer and
/// chain.
///
/// The slot stores the construction cell rather than the finished client, so
/// concurrent callers with the same key wait on one construction.
pub struct SmartWalletClientCache {
    config: Arc<WalletConfig>,
    connector: Arc<dyn WalletApiConnector>,
    slot: Mutex<ClientSlot>,
}

impl SmartWalletClientCache {
    pub fn new(config: Arc<WalletConfig>, connector: Arc<dyn WalletApiConnector>) -> Self {
        Self {
            config,
            connector,
            slot: Mutex::new(None),
        }
    }

    /// Returns the client for the session's current signer and chain,
    /// building it on first use.
    pub async fn get_client(
        &self,
        session: &WalletSession,
    ) -> Result<Arc<SmartWalletClient>, WalletError> {
        let signer = session.current_signer().await?;
        let chain = session.active_chain().await?;
        let key = (session.epoch(), signer.address(), chain.id);

        let cell = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some((cached, cell)) if *cached == key => {
                    debug!(chain_id = chain.id, "client cache hit");
                    cell.clone()
                }
                _ => {
                    let cell = Arc::new(OnceCell::new());
                    *slot = Some((key, cell.clone()));
                    cell
                }
            }
        };

        let client = cell
            .get_or_try_init(|| async move { self.build(chain, signer) })
            .await?;
        Ok(client.clone())
    }

    /// Drops the cached client; the next [`get_client`](Self::get_client)
    /// builds a fresh one.
    pub async fn invalidate(&self) {
        if self.slot.lock().await.take().is_some() {
            debug!("client cache invalidated");
        }
    }

    fn build(
        &self,
        chain: &'static ChainDescriptor,
        signer: Arc<dyn Signer>,
    ) -> Result<Arc<SmartWalletClient>, WalletError> {
        let transport = self.config.transport()?;
        let api = self.connector.connect(chain, &transport)?;
        let client = SmartWalletClient::new(chain, signer, api, &self.config);
        info!(
            serial = client.serial(),
            chain_id = chain.id,
            account = %client.account(),
            sponsored = client.policy_id().is_some(),
            "built smart wallet client"
        );
        Ok(Arc::new(client))
    }
}
