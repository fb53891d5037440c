use std::time::Duration;

use chain_eth::error::EthError;
use thiserror::Error;

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad user input. Shown immediately, never retried.
    Validation,
    /// No wallet or signer. Resolved by re-authenticating.
    Session,
    /// Missing or malformed configuration.
    Configuration,
    /// A collaborator returned a shape this client refuses to act on.
    ContractViolation,
    /// Network or RPC failure. The user may retry.
    Transport,
    /// A bounded wait ran out. The user may retry.
    Timeout,
    /// The operation is not allowed in the current workflow state.
    InvalidState,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Unknown token {token} on chain {chain_id}")]
    UnknownToken { token: String, chain_id: u64 },

    #[error("Swaps are only available on chain {expected}; active chain is {active}")]
    ChainMismatch { expected: u64, active: u64 },

    #[error("Quote expired at {expiry} (unix seconds)")]
    QuoteExpired { expiry: u64 },

    #[error("No embedded wallet: {0}")]
    NoWallet(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Missing transport configuration: one of api key, jwt or rpc url is required")]
    MissingTransportConfig,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Received raw calls instead of prepared calls")]
    UnexpectedRawCalls,

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Calls failed with status {0}")]
    CallsFailed(u16),

    #[error("Timed out after {0:?} waiting for call status")]
    Timeout(Duration),

    /// The caller stopped awaiting before the outcome was known.
    #[error("Abandoned before completion")]
    Abandoned,

    #[error("No prepared swap to submit")]
    NoPreparedSwap,

    #[error("Prepared swap is not the outstanding one")]
    StalePreparedSwap,

    #[error("Busy: {0}")]
    Busy(&'static str),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidAddress(_)
            | WalletError::InvalidAmount(_)
            | WalletError::UnsupportedChain(_)
            | WalletError::UnknownToken { .. }
            | WalletError::ChainMismatch { .. }
            | WalletError::QuoteExpired { .. } => ErrorKind::Validation,
            WalletError::NoWallet(_) | WalletError::Signing(_) => ErrorKind::Session,
            WalletError::MissingTransportConfig | WalletError::Config(_) => {
                ErrorKind::Configuration
            }
            WalletError::UnexpectedRawCalls | WalletError::UnexpectedResponse(_) => {
                ErrorKind::ContractViolation
            }
            WalletError::Transport(_) | WalletError::Rpc { .. } | WalletError::CallsFailed(_) => {
                ErrorKind::Transport
            }
            WalletError::Timeout(_) | WalletError::Abandoned => ErrorKind::Timeout,
            WalletError::NoPreparedSwap
            | WalletError::StalePreparedSwap
            | WalletError::Busy(_) => ErrorKind::InvalidState,
        }
    }

    /// Whether the user can sensibly try the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Timeout)
    }
}

impl From<EthError> for WalletError {
    fn from(e: EthError) -> Self {
        match e {
            EthError::InvalidAddress(msg) => WalletError::InvalidAddress(msg),
            EthError::InvalidAmount(msg) => WalletError::InvalidAmount(msg),
            EthError::InvalidChainId(raw) => WalletError::UnsupportedChain(raw),
            EthError::UnsupportedChain(id) => WalletError::UnsupportedChain(id.to_string()),
            EthError::InvalidPrivateKey(msg)
            | EthError::InvalidPublicKey(msg)
            | EthError::SigningError(msg) => WalletError::Signing(msg),
            EthError::EncodingError(msg) => WalletError::UnexpectedResponse(msg),
        }
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(e: reqwest::Error) -> Self {
        WalletError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::UnexpectedResponse(e.to_string())
    }
}
