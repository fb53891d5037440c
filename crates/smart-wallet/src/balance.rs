//! Native and ERC-20 balance reads with per-field degradation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use alloy_primitives::{Address, U256};
use chain_eth::chains::{self, ChainDescriptor, TokenInfo};
use chain_eth::erc20::{decode_balance_of, encode_balance_of};
use chain_eth::units::format_display;
use tracing::{debug, warn};

use crate::error::WalletError;
use crate::services::ChainReader;

/// One balance, or the sentinel shown when its read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceField {
    Amount { raw: U256, decimals: u8 },
    Unavailable,
}

impl BalanceField {
    pub fn raw(&self) -> Option<U256> {
        match self {
            BalanceField::Amount { raw, .. } => Some(*raw),
            BalanceField::Unavailable => None,
        }
    }

    /// `"1.500000"` for 18-decimal assets, `"12.34"` for 6-decimal ones.
    pub fn display(&self) -> String {
        match self {
            BalanceField::Amount { raw, decimals } => format_display(*raw, *decimals),
            BalanceField::Unavailable => "Unavailable".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBalance {
    pub token: TokenInfo,
    pub balance: BalanceField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balances {
    pub address: Address,
    pub chain_id: u64,
    pub native: BalanceField,
    pub tokens: Vec<TokenBalance>,
}

impl Balances {
    pub fn token(&self, symbol: &str) -> Option<&TokenBalance> {
        self.tokens
            .iter()
            .find(|t| t.token.symbol.eq_ignore_ascii_case(symbol))
    }
}

pub struct BalanceReader {
    reader: Arc<dyn ChainReader>,
}

impl BalanceReader {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self { reader }
    }

    /// Reads the native balance and every known token balance of `address`.
    /// Only an unsupported chain fails the whole read.
    pub async fn read_balances(
        &self,
        address: Address,
        chain_id: u64,
    ) -> Result<Balances, WalletError> {
        let chain = chains::resolve(chain_id)?;

        let native = match self.reader.get_balance(chain, address).await {
            Ok(raw) => BalanceField::Amount {
                raw,
                decimals: chain.decimals,
            },
            Err(e) => {
                warn!(chain_id, error = %e, "native balance unavailable");
                BalanceField::Unavailable
            }
        };

        let mut tokens = Vec::with_capacity(chain.tokens.len());
        for token in chain.tokens {
            let balance = self.read_token(chain, token, address).await;
            tokens.push(TokenBalance {
                token: *token,
                balance,
            });
        }

        debug!(chain_id, address = %address, tokens = tokens.len(), "balances read");
        Ok(Balances {
            address,
            chain_id,
            native,
            tokens,
        })
    }

    async fn read_token(
        &self,
        chain: &ChainDescriptor,
        token: &TokenInfo,
        owner: Address,
    ) -> BalanceField {
        let result = match self
            .reader
            .call(chain, token.address, encode_balance_of(&owner))
            .await
        {
            Ok(returned) => decode_balance_of(&returned).map_err(WalletError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(raw) => BalanceField::Amount {
                raw,
                decimals: token.decimals,
            },
            Err(e) => {
                warn!(
                    chain_id = chain.id,
                    token = token.symbol,
                    error = %e,
                    "token balance unavailable"
                );
                BalanceField::Unavailable
            }
        }
    }
}

/// Outcome of [`BalanceWatcher::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    Applied(Balances),
    /// A newer refresh started before this one finished; its result was
    /// dropped.
    Superseded,
}

/// Keeps the latest balances for changing (address, chain) inputs.
pub struct BalanceWatcher {
    reader: BalanceReader,
    generation: AtomicU64,
    latest: Mutex<Option<Balances>>,
}

impl BalanceWatcher {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self {
            reader: BalanceReader::new(reader),
            generation: AtomicU64::new(0),
            latest: Mutex::new(None),
        }
    }

    /// Reads balances for the given inputs and stores them unless a newer
    /// refresh was started in the meantime.
    pub async fn refresh(&self, address: Address, chain_id: u64) -> Result<Refresh, WalletError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let balances = self.reader.read_balances(address, chain_id).await?;

        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation {
            warn!(generation, chain_id, "balance refresh superseded");
            return Ok(Refresh::Superseded);
        }
        *latest = Some(balances.clone());
        Ok(Refresh::Applied(balances))
    }

    pub fn latest(&self) -> Option<Balances> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forgets the stored balances and supersedes reads in flight.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
