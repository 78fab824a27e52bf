#![allow(dead_code)]
use soroban_sdk::{Address, Env};

// Price feed interface as exposed by the price-oracle contract
#[soroban_sdk::contractclient(name = "PriceFeedClient")]
pub trait Contract {
    fn get_underlying_price(e: Env, asset: Address) -> Option<u128>;
    fn decimals(e: Env) -> u32;
}
