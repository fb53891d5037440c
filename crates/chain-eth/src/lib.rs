//! EVM chain support for the smart-wallet client.
//!
//! This crate provides:
//! - A static registry of supported networks and their known tokens
//! - Address validation with EIP-55 checksum verification
//! - Integer-exact conversion between decimal strings and token base units
//! - ERC-20 `balanceOf` call encoding and minimal ABI helpers
//! - EIP-7702 authorization requests, merging and signing hashes
//! - A local secp256k1 signer (messages, authorizations, EIP-1559 transactions)

pub mod abi;
pub mod address;
pub mod authorization;
pub mod chains;
pub mod erc20;
pub mod error;
pub mod signing;
pub mod transaction;
pub mod units;
