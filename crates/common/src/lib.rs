//! Chain primitives and shared utilities for the drip faucet.

pub mod types;
pub mod utils;

pub use types::{Address, AddressError, TxHash};
