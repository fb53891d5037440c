use alloy_primitives::{Address, Bytes, U256};

use crate::abi::{decode_uint256, encode_function_call, AbiParam};
use crate::error::EthError;

/// Function selector for `balanceOf(address)`: `0x70a08231`.
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Encodes an ERC-20 `balanceOf(address)` call (36 bytes of calldata).
pub fn encode_balance_of(owner: &Address) -> Bytes {
    encode_function_call(BALANCE_OF_SELECTOR, &[AbiParam::Address(*owner)]).into()
}

/// Decodes the uint256 returned by `balanceOf`.
pub fn decode_balance_of(returned: &[u8]) -> Result<U256, EthError> {
    decode_uint256(returned)
}
