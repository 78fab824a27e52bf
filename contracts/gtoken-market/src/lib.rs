#![no_std]

mod contract;
mod events;
mod risk;
mod storage;

pub use contract::{GTokenMarket, GTokenMarketClient};
pub use storage::{DataKey, MarketSnapshot};

mod test;
