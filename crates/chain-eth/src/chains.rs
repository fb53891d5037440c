use alloy_primitives::{address, Address};
use serde::Serialize;

use crate::error::EthError;

/// Pseudo-address used by swap services to denote the chain's native asset.
pub const NATIVE_TOKEN_ADDRESS: Address = address!("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Chain id of the production network. Swaps are only offered here.
pub const PRODUCTION_CHAIN_ID: u64 = 8453;

/// An ERC-20 token (or the native asset) known on a particular chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub symbol: &'static str,
    pub address: Address,
    pub decimals: u8,
}

impl TokenInfo {
    /// Whether this entry denotes the native asset rather than a contract.
    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN_ADDRESS
    }
}

/// Definition of an EVM-compatible network.
#[derive(Debug, Clone, Serialize)]
pub struct ChainDescriptor {
    pub id: u64,
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
    pub is_testnet: bool,
    /// ERC-20 tokens with known addresses on this chain.
    pub tokens: &'static [TokenInfo],
}

impl ChainDescriptor {
    /// The chain's native asset expressed as a token entry.
    pub fn native_token(&self) -> TokenInfo {
        TokenInfo {
            symbol: self.symbol,
            address: NATIVE_TOKEN_ADDRESS,
            decimals: self.decimals,
        }
    }

    /// Looks up a token by contract address. The native sentinel resolves to
    /// [`native_token`](Self::native_token).
    pub fn token_by_address(&self, address: &Address) -> Option<TokenInfo> {
        if *address == NATIVE_TOKEN_ADDRESS {
            return Some(self.native_token());
        }
        self.tokens.iter().find(|t| t.address == *address).copied()
    }

    /// Looks up a token by symbol, case-insensitively.
    pub fn token_by_symbol(&self, symbol: &str) -> Option<TokenInfo> {
        if symbol.eq_ignore_ascii_case(self.symbol) {
            return Some(self.native_token());
        }
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .copied()
    }

    /// Whether the two-phase swap flow is offered on this chain.
    pub fn supports_swaps(&self) -> bool {
        self.id == PRODUCTION_CHAIN_ID
    }

    /// Block explorer link for a transaction hash.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{tx_hash}", self.explorer_url)
    }
}

const BASE_TOKENS: &[TokenInfo] = &[
    TokenInfo {
        symbol: "USDC",
        address: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        decimals: 6,
    },
    TokenInfo {
        symbol: "WETH",
        address: address!("0x4200000000000000000000000000000000000006"),
        decimals: 18,
    },
];

const BASE_SEPOLIA_TOKENS: &[TokenInfo] = &[
    TokenInfo {
        symbol: "USDC",
        address: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
        decimals: 6,
    },
    TokenInfo {
        symbol: "WETH",
        address: address!("0x4200000000000000000000000000000000000006"),
        decimals: 18,
    },
];

/// Base mainnet (chain ID 8453).
pub const BASE: ChainDescriptor = ChainDescriptor {
    id: PRODUCTION_CHAIN_ID,
    name: "Base",
    symbol: "ETH",
    decimals: 18,
    rpc_url: "https://mainnet.base.org",
    explorer_url: "https://basescan.org",
    is_testnet: false,
    tokens: BASE_TOKENS,
};

/// Base Sepolia testnet (chain ID 84532).
pub const BASE_SEPOLIA: ChainDescriptor = ChainDescriptor {
    id: 84532,
    name: "Base Sepolia",
    symbol: "ETH",
    decimals: 18,
    rpc_url: "https://sepolia.base.org",
    explorer_url: "https://sepolia.basescan.org",
    is_testnet: true,
    tokens: BASE_SEPOLIA_TOKENS,
};

const ALL_CHAINS: &[&ChainDescriptor] = &[&BASE, &BASE_SEPOLIA];

/// Returns the chain definition for a given chain ID, or `None` if unsupported.
pub fn get_chain(chain_id: u64) -> Option<&'static ChainDescriptor> {
    ALL_CHAINS.iter().find(|c| c.id == chain_id).copied()
}

/// Returns the chain definition for a given chain ID.
pub fn resolve(chain_id: u64) -> Result<&'static ChainDescriptor, EthError> {
    get_chain(chain_id).ok_or(EthError::UnsupportedChain(chain_id))
}

/// Parses a chain id given either as a plain integer (`"8453"`) or in
/// CAIP-2 form (`"eip155:8453"`). Only the part after the last `:` is read.
pub fn parse_chain_id(raw: &str) -> Result<u64, EthError> {
    let trimmed = raw.trim();
    let reference = trimmed.rsplit(':').next().unwrap_or(trimmed);
    reference
        .parse::<u64>()
        .map_err(|_| EthError::InvalidChainId(raw.to_string()))
}

/// Parses and resolves a plain or CAIP-2 chain id.
pub fn resolve_str(raw: &str) -> Result<&'static ChainDescriptor, EthError> {
    resolve(parse_chain_id(raw)?)
}

/// Returns all supported chain definitions.
pub fn supported_chains() -> Vec<&'static ChainDescriptor> {
    ALL_CHAINS.to_vec()
}
