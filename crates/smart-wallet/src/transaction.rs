//! Transaction submission orchestrator.
//!
//! Drives `Idle → Submitting → {Succeeded, Failed}` for one submission at a
//! time and publishes every transition on a watch channel.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use chain_eth::address::parse_address;
use chain_eth::units::{parse_quantity, parse_units};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::SmartWalletClientCache;
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::services::Call;
use crate::session::WalletSession;

/// Decimals of the native asset on every supported chain.
pub const NATIVE_DECIMALS: u8 = 18;

/// A single call as entered by a caller, validated before submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: String,
    /// Decimal or `0x` hex integer in base units.
    pub value: String,
    pub data: Bytes,
}

impl TransactionRequest {
    /// Checks the recipient and value and converts to wire form.
    pub fn to_call(&self) -> Result<Call, WalletError> {
        let to = parse_address(&self.to)?;
        let value = if self.value.trim().is_empty() {
            U256::ZERO
        } else {
            parse_quantity(&self.value)?
        };
        Ok(Call {
            to,
            data: self.data.clone(),
            value: Some(value),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Overrides the configured sponsorship default.
    pub sponsored: Option<bool>,
}

impl SendOptions {
    pub fn unsponsored() -> Self {
        Self {
            sponsored: Some(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendResult {
    pub transaction_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Succeeded(SendResult),
    Failed(WalletError),
}

impl SubmissionState {
    pub fn is_submitting(&self) -> bool {
        matches!(self, SubmissionState::Submitting)
    }
}

pub struct TransactionOrchestrator {
    session: Arc<WalletSession>,
    cache: Arc<SmartWalletClientCache>,
    config: Arc<WalletConfig>,
    state: watch::Sender<SubmissionState>,
}

impl TransactionOrchestrator {
    pub fn new(
        session: Arc<WalletSession>,
        cache: Arc<SmartWalletClientCache>,
        config: Arc<WalletConfig>,
    ) -> Self {
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            session,
            cache,
            config,
            state,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    /// Submits one call.
    pub async fn submit(
        &self,
        request: &TransactionRequest,
        options: SendOptions,
    ) -> Result<SendResult, WalletError> {
        let in_flight = self.begin()?;
        let outcome = match request.to_call() {
            Ok(call) => self.run(vec![call], options).await,
            Err(e) => Err(e),
        };
        self.finish(in_flight, outcome)
    }

    /// Submits a batch of calls as one operation.
    pub async fn submit_calls(
        &self,
        requests: &[TransactionRequest],
        options: SendOptions,
    ) -> Result<SendResult, WalletError> {
        let in_flight = self.begin()?;
        let calls: Result<Vec<Call>, WalletError> =
            requests.iter().map(TransactionRequest::to_call).collect();
        let outcome = match calls {
            Ok(calls) if calls.is_empty() => {
                Err(WalletError::InvalidAmount("no calls to submit".into()))
            }
            Ok(calls) => self.run(calls, options).await,
            Err(e) => Err(e),
        };
        self.finish(in_flight, outcome)
    }

    /// Sends `amount` of the native asset, given as a decimal such as
    /// `"0.01"`. Zero is rejected.
    pub async fn send_transfer(
        &self,
        to: &str,
        amount: &str,
        options: SendOptions,
    ) -> Result<SendResult, WalletError> {
        let in_flight = self.begin()?;
        let outcome = match validate_transfer(to, amount) {
            Ok(call) => self.run(vec![call], options).await,
            Err(e) => Err(e),
        };
        self.finish(in_flight, outcome)
    }

    /// Returns to `Idle`, clearing any result or error. Not allowed while a
    /// submission is in flight.
    pub fn reset(&self) -> Result<(), WalletError> {
        let mut busy = false;
        self.state.send_if_modified(|state| match state {
            SubmissionState::Submitting => {
                busy = true;
                false
            }
            SubmissionState::Idle => false,
            _ => {
                *state = SubmissionState::Idle;
                true
            }
        });
        if busy {
            Err(WalletError::Busy("transaction submission in progress"))
        } else {
            Ok(())
        }
    }

    fn begin(&self) -> Result<InFlight<'_>, WalletError> {
        let mut busy = false;
        self.state.send_if_modified(|state| {
            if state.is_submitting() {
                busy = true;
                return false;
            }
            *state = SubmissionState::Submitting;
            true
        });
        if busy {
            Err(WalletError::Busy("transaction submission in progress"))
        } else {
            Ok(InFlight {
                state: &self.state,
                armed: true,
            })
        }
    }

    fn finish(
        &self,
        in_flight: InFlight<'_>,
        outcome: Result<SendResult, WalletError>,
    ) -> Result<SendResult, WalletError> {
        in_flight.disarm();
        match &outcome {
            Ok(result) => {
                info!(tx_hash = %result.transaction_hash, "transaction confirmed");
                self.state.send_replace(SubmissionState::Succeeded(*result));
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "transaction failed");
                self.state.send_replace(SubmissionState::Failed(e.clone()));
            }
        }
        outcome
    }

    async fn run(&self, calls: Vec<Call>, options: SendOptions) -> Result<SendResult, WalletError> {
        let client = self.cache.get_client(&self.session).await?;
        let sponsored = options.sponsored.unwrap_or(self.config.default_sponsored);
        let id = client.send_calls(calls, sponsored).await?;
        let transaction_hash = client.wait_for_calls_status(&id).await?;
        Ok(SendResult { transaction_hash })
    }
}

/// Moves the state out of `Submitting` if the submitting future is dropped
/// before [`TransactionOrchestrator::finish`] runs.
struct InFlight<'a> {
    state: &'a watch::Sender<SubmissionState>,
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
        warn!("transaction submission dropped before completion");
        self.state.send_if_modified(|state| {
            if !state.is_submitting() {
                return false;
            }
            *state = SubmissionState::Failed(WalletError::Abandoned);
            true
        });
    }
}

fn validate_transfer(to: &str, amount: &str) -> Result<Call, WalletError> {
    let to: Address = parse_address(to)?;
    let value = parse_units(amount, NATIVE_DECIMALS)?;
    if value.is_zero() {
        return Err(WalletError::InvalidAmount(format!(
            "{} is not a valid amount",
            amount.trim()
        )));
    }
    Ok(Call {
        to,
        data: Bytes::new(),
        value: Some(value),
    })
}
