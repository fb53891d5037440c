//! Two-phase swap workflow.
//!
//! `prepare` fetches a quote together with the exact call bundle that
//! executes it. `submit` sends that bundle unmodified. The orchestrator holds
//! at most one prepared swap, and `submit` only accepts the very
//! `Arc<PreparedSwap>` that `prepare` handed out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256, U256, U64};
use chain_eth::address::parse_address;
use chain_eth::chains::{ChainDescriptor, TokenInfo, PRODUCTION_CHAIN_ID};
use chain_eth::units::{format_display, parse_units};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::SmartWalletClientCache;
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::services::{CallBundle, PreparedCall, Quote, QuoteRequest};
use crate::session::WalletSession;

/// Which side of the swap the user fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountSpec {
    /// Decimal amount of the source token to spend.
    ExactFrom(String),
    /// Decimal amount of the destination token to receive at least.
    MinimumTo(String),
}

/// A quote and the call bundle that executes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSwap {
    pub quote: Quote,
    pub call: PreparedCall,
    pub from_token: TokenInfo,
    pub to_token: TokenInfo,
    pub chain_id: u64,
}

impl PreparedSwap {
    /// Amount sent, in the source token's display precision.
    pub fn display_from_amount(&self) -> String {
        format_display(self.quote.from_amount, self.from_token.decimals)
    }

    /// Minimum amount received, in the destination token's display
    /// precision.
    pub fn display_minimum_to_amount(&self) -> String {
        format_display(self.quote.minimum_to_amount, self.to_token.decimals)
    }

    pub fn expiry_secs(&self) -> u64 {
        self.quote.expiry_secs()
    }

    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        now_secs >= self.expiry_secs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapResult {
    pub transaction_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SwapState {
    #[default]
    Idle,
    Preparing,
    Prepared(Arc<PreparedSwap>),
    Submitting(Arc<PreparedSwap>),
    Completed(SwapResult),
    /// A failed prepare or submit. A failed submit retains its bundle so it
    /// can be retried or cancelled.
    Failed {
        error: WalletError,
        retained: Option<Arc<PreparedSwap>>,
    },
}

impl SwapState {
    /// The bundle a `submit` may currently send, if any.
    pub fn outstanding(&self) -> Option<&Arc<PreparedSwap>> {
        match self {
            SwapState::Prepared(swap)
            | SwapState::Failed {
                retained: Some(swap),
                ..
            } => Some(swap),
            _ => None,
        }
    }
}

/// Whether the swap form should be enabled on `chain`.
pub fn is_available(chain: &ChainDescriptor) -> bool {
    chain.supports_swaps()
}

/// Why swaps are disabled on `chain`, or `None` when they are offered.
pub fn availability_notice(chain: &ChainDescriptor) -> Option<String> {
    if is_available(chain) {
        return None;
    }
    Some(format!(
        "Token swaps are only available on mainnet. \
         You are connected to {} ({}); switch to chain {} to swap.",
        chain.name, chain.id, PRODUCTION_CHAIN_ID
    ))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct SwapOrchestrator {
    session: Arc<WalletSession>,
    cache: Arc<SmartWalletClientCache>,
    config: Arc<WalletConfig>,
    state: watch::Sender<SwapState>,
    /// Bumped by every prepare and cancel so a superseded quote cannot
    /// reclaim the slot.
    generation: AtomicU64,
}

impl SwapOrchestrator {
    pub fn new(
        session: Arc<WalletSession>,
        cache: Arc<SmartWalletClientCache>,
        config: Arc<WalletConfig>,
    ) -> Self {
        let (state, _) = watch::channel(SwapState::Idle);
        Self {
            session,
            cache,
            config,
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SwapState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SwapState> {
        self.state.subscribe()
    }

    /// Requests a quote for swapping `from_token` into `to_token` and stores
    /// the returned bundle, replacing any earlier prepared swap.
    ///
    /// A prepare that is cancelled while its quote is in flight returns
    /// [`WalletError::StalePreparedSwap`] and leaves the slot alone.
    pub async fn prepare(
        &self,
        from_token: &str,
        to_token: &str,
        amount: AmountSpec,
    ) -> Result<Arc<PreparedSwap>, WalletError> {
        let mut rejected = None;
        let mut ticket = 0;
        self.state.send_if_modified(|state| match state {
            SwapState::Preparing | SwapState::Submitting(_) => {
                rejected = Some(WalletError::Busy("swap in progress"));
                false
            }
            SwapState::Failed {
                retained: Some(_), ..
            } => {
                rejected = Some(WalletError::Busy("cancel the failed swap first"));
                false
            }
            _ => {
                ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                *state = SwapState::Preparing;
                true
            }
        });
        if let Some(e) = rejected {
            return Err(e);
        }

        let in_flight = self.in_flight(ticket, None);
        let outcome = self.quote(from_token, to_token, amount).await;
        in_flight.disarm();

        let owns_slot = |state: &SwapState| {
            matches!(state, SwapState::Preparing)
                && self.generation.load(Ordering::SeqCst) == ticket
        };
        match outcome {
            Ok(swap) => {
                let swap = Arc::new(swap);
                let stored = self.state.send_if_modified(|state| {
                    if !owns_slot(state) {
                        return false;
                    }
                    *state = SwapState::Prepared(swap.clone());
                    true
                });
                if !stored {
                    info!(ticket, "quote arrived after the swap was cancelled");
                    return Err(WalletError::StalePreparedSwap);
                }
                info!(
                    from = swap.from_token.symbol,
                    to = swap.to_token.symbol,
                    from_amount = %swap.quote.from_amount,
                    minimum_to_amount = %swap.quote.minimum_to_amount,
                    expiry = swap.expiry_secs(),
                    "swap prepared"
                );
                Ok(swap)
            }
            Err(error) => {
                warn!(error = %error, "swap prepare failed");
                self.state.send_if_modified(|state| {
                    if !owns_slot(state) {
                        return false;
                    }
                    *state = SwapState::Failed {
                        error: error.clone(),
                        retained: None,
                    };
                    true
                });
                Err(error)
            }
        }
    }

    /// Sends the outstanding prepared swap. `swap` must be the bundle
    /// [`prepare`](Self::prepare) returned.
    pub async fn submit(&self, swap: &Arc<PreparedSwap>) -> Result<SwapResult, WalletError> {
        let now = now_secs();
        let mut rejected = None;
        let mut ticket = 0;
        self.state.send_if_modified(|state| {
            match state {
                SwapState::Preparing | SwapState::Submitting(_) => {
                    rejected = Some(WalletError::Busy("swap in progress"));
                    return false;
                }
                _ => {}
            }
            let Some(outstanding) = state.outstanding() else {
                rejected = Some(WalletError::NoPreparedSwap);
                return false;
            };
            if !Arc::ptr_eq(outstanding, swap) {
                rejected = Some(WalletError::StalePreparedSwap);
                return false;
            }
            if swap.is_expired_at(now) {
                let error = WalletError::QuoteExpired {
                    expiry: swap.expiry_secs(),
                };
                rejected = Some(error.clone());
                *state = SwapState::Failed {
                    error,
                    retained: None,
                };
                return true;
            }
            ticket = self.generation.load(Ordering::SeqCst);
            *state = SwapState::Submitting(swap.clone());
            true
        });
        if let Some(e) = rejected {
            return Err(e);
        }

        let in_flight = self.in_flight(ticket, Some(swap.clone()));
        let outcome = self.execute(swap).await;
        in_flight.disarm();

        match outcome {
            Ok(result) => {
                info!(tx_hash = %result.transaction_hash, "swap submitted");
                self.state.send_replace(SwapState::Completed(result));
                Ok(result)
            }
            Err(error) => {
                warn!(error = %error, retryable = error.is_retryable(), "swap submit failed");
                self.state.send_replace(SwapState::Failed {
                    error: error.clone(),
                    retained: Some(swap.clone()),
                });
                Err(error)
            }
        }
    }

    /// Discards the prepared swap, or the quote being fetched. Nothing is
    /// sent on-chain.
    pub fn cancel(&self) -> Result<(), WalletError> {
        let mut busy = false;
        self.state.send_if_modified(|state| match state {
            SwapState::Submitting(_) => {
                busy = true;
                false
            }
            SwapState::Idle => false,
            _ => {
                self.generation.fetch_add(1, Ordering::SeqCst);
                *state = SwapState::Idle;
                true
            }
        });
        if busy {
            Err(WalletError::Busy("swap submission in progress"))
        } else {
            Ok(())
        }
    }

    fn in_flight(&self, ticket: u64, retained: Option<Arc<PreparedSwap>>) -> InFlight<'_> {
        InFlight {
            state: &self.state,
            generation: &self.generation,
            ticket,
            retained,
            armed: true,
        }
    }

    async fn quote(
        &self,
        from_token: &str,
        to_token: &str,
        amount: AmountSpec,
    ) -> Result<PreparedSwap, WalletError> {
        let chain = self.session.active_chain().await?;
        if !is_available(chain) {
            return Err(WalletError::ChainMismatch {
                expected: PRODUCTION_CHAIN_ID,
                active: chain.id,
            });
        }

        let from = known_token(chain, from_token)?;
        let to = known_token(chain, to_token)?;
        if from.address == to.address {
            return Err(WalletError::InvalidAddress(
                "source and destination tokens are the same".into(),
            ));
        }

        let (from_amount, minimum_to_amount) = match &amount {
            AmountSpec::ExactFrom(value) => (Some(positive_units(value, from.decimals)?), None),
            AmountSpec::MinimumTo(value) => (None, Some(positive_units(value, to.decimals)?)),
        };

        let client = self.cache.get_client(&self.session).await?;
        let request = QuoteRequest {
            from: client.account(),
            chain_id: U64::from(chain.id),
            from_token: from.address,
            to_token: to.address,
            from_amount,
            minimum_to_amount,
            return_raw_calls: false,
            capabilities: client.capabilities(self.config.default_sponsored),
        };
        let response = client.request_quote(&request).await?;

        match response.bundle {
            CallBundle::Prepared(call) => Ok(PreparedSwap {
                quote: response.quote,
                call,
                from_token: from,
                to_token: to,
                chain_id: chain.id,
            }),
            CallBundle::Raw(_) => Err(WalletError::UnexpectedRawCalls),
        }
    }

    async fn execute(&self, swap: &PreparedSwap) -> Result<SwapResult, WalletError> {
        let client = self.cache.get_client(&self.session).await?;
        if client.chain().id != swap.chain_id {
            return Err(WalletError::ChainMismatch {
                expected: swap.chain_id,
                active: client.chain().id,
            });
        }
        let id = client.send_prepared(&swap.call).await?;
        let transaction_hash = client.wait_for_calls_status(&id).await?;
        Ok(SwapResult { transaction_hash })
    }
}

/// Fails the slot with [`WalletError::Abandoned`] if a prepare or submit
/// future is dropped mid-flight. A dropped submit keeps its bundle.
struct InFlight<'a> {
    state: &'a watch::Sender<SwapState>,
    generation: &'a AtomicU64,
    ticket: u64,
    retained: Option<Arc<PreparedSwap>>,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let retained = self.retained.take();
        self.state.send_if_modified(|state| {
            let ours = self.generation.load(Ordering::SeqCst) == self.ticket
                && match (&*state, &retained) {
                    (SwapState::Preparing, None) => true,
                    (SwapState::Submitting(current), Some(swap)) => Arc::ptr_eq(current, swap),
                    _ => false,
                };
            if ours {
                warn!(ticket = self.ticket, "swap dropped before completion");
                *state = SwapState::Failed {
                    error: WalletError::Abandoned,
                    retained: retained.clone(),
                };
            }
            ours
        });
    }
}

fn known_token(chain: &ChainDescriptor, raw: &str) -> Result<TokenInfo, WalletError> {
    let address: Address = parse_address(raw)?;
    chain
        .token_by_address(&address)
        .ok_or_else(|| WalletError::UnknownToken {
            token: raw.trim().to_string(),
            chain_id: chain.id,
        })
}

fn positive_units(value: &str, decimals: u8) -> Result<U256, WalletError> {
    let units = parse_units(value, decimals)?;
    if units.is_zero() {
        return Err(WalletError::InvalidAmount(format!(
            "{} is not a valid amount",
            value.trim()
        )));
    }
    Ok(units)
}
