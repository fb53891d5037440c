//! Client-side orchestration for an account-abstraction smart wallet.
//!
//! The crate glues an embedded-wallet auth provider, a chain RPC node and a
//! hosted wallet service together: it normalizes the embedded wallet into a
//! [`Signer`](signer::Signer), memoizes a [`SmartWalletClient`] per session and
//! chain, and drives transaction submission, two-phase swaps and balance
//! reads as observable state machines. [`WalletContext`] wires them up from
//! one [`WalletConfig`].

pub mod balance;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod rpc;
pub mod services;
pub mod session;
pub mod signer;
pub mod swap;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use balance::{BalanceField, BalanceReader, BalanceWatcher, Balances, Refresh, TokenBalance};
pub use client::{SmartWalletClient, SmartWalletClientCache};
pub use config::{TransportConfig, WalletConfig};
pub use context::WalletContext;
pub use error::{ErrorKind, WalletError};
pub use session::WalletSession;
pub use swap::{AmountSpec, PreparedSwap, SwapOrchestrator, SwapResult, SwapState};
pub use transaction::{
    SendOptions, SendResult, SubmissionState, TransactionOrchestrator, TransactionRequest,
};

pub use chain_eth;
