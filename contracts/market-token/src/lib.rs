#![no_std]

mod constants;
mod contract;
mod events;
mod helpers;
mod storage;

pub use contract::{MarketToken, MarketTokenClient};
pub use storage::{BorrowSnapshot, MarketSnapshot};
