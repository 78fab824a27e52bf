#![allow(dead_code)]
use soroban_sdk::{Address, Env};

use crate::storage::MarketSnapshot;

// Comptroller admission interface as seen from a market
#[soroban_sdk::contractclient(name = "RiskHubClient")]
pub trait Contract {
    fn is_listed(e: Env, market: Address) -> bool;
    fn get_reserve_recipient(e: Env) -> Address;
    fn mint_allowed(e: Env, market: Address, minter: Address, amount: u128) -> u32;
    fn redeem_allowed(
        e: Env,
        market: Address,
        redeemer: Address,
        receipt_tokens: u128,
        snap: MarketSnapshot,
    ) -> u32;
    fn borrow_allowed(
        e: Env,
        market: Address,
        borrower: Address,
        amount: u128,
        snap: MarketSnapshot,
    ) -> u32;
    fn repay_allowed(e: Env, market: Address, payer: Address, borrower: Address, amount: u128)
        -> u32;
    fn transfer_allowed(
        e: Env,
        market: Address,
        from: Address,
        to: Address,
        receipt_tokens: u128,
        snap: MarketSnapshot,
    ) -> u32;
    fn seize_allowed(e: Env, collateral_market: Address, seizer_market: Address) -> u32;
    fn liquidate_allowed(
        e: Env,
        debt_market: Address,
        collateral_market: Address,
        borrower: Address,
        repay_amount: u128,
        snap: MarketSnapshot,
    ) -> u32;
    fn liquidate_calculate_seize(
        e: Env,
        debt_market: Address,
        collateral_market: Address,
        repay_amount: u128,
        snap: MarketSnapshot,
    ) -> (u128, u128);
}
