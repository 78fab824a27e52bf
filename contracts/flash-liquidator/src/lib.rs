#![no_std]
use soroban_sdk::auth::{ContractContext, InvokerContractAuthEntry, SubContractInvocation};
use soroban_sdk::{
    contract, contractevent, contractimpl, contracttype, token, Address, Bytes, Env, IntoVal,
    Symbol, Vec,
};

#[contracttype]
pub enum DataKey {
    Owner,
    FlashSource,      // market lending the flash funds (not the one liquidated)
    DebtMarket,       // market whose borrow is repaid
    CollateralMarket, // market whose gTokens are seized
    SwapAdapter,      // Address (optional)
    PlannedBorrower,  // Address, set between plan_liquidation and the callback
    PlannedRepay,     // u128
}

// Market interface as seen from the liquidator
#[soroban_sdk::contractclient(name = "MarketClient")]
pub trait MarketContract {
    fn liquidate_borrow(
        env: Env,
        liquidator: Address,
        borrower: Address,
        repay_amount: u128,
        collateral_market: Address,
    );
    fn redeem(env: Env, user: Address, gtoken_amount: u128);
    fn get_underlying_token(env: Env) -> Address;
    fn get_gtoken_balance(env: Env, user: Address) -> u128;
}

#[soroban_sdk::contractclient(name = "SwapAdapterClient")]
pub trait SwapAdapterContract {
    fn swap(
        env: Env,
        user: Address,
        token_in: Address,
        token_out: Address,
        amount_in: u128,
        min_out: u128,
    ) -> u128;
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LiquidationExecuted {
    #[topic]
    pub borrower: Address,
    pub repay_amount: u128,
    pub profit: u128,
}

/// Flash-loan-funded liquidation: repays part of a shortfallen borrow with
/// funds borrowed for the duration of one call, redeems the seized
/// collateral, swaps it back into the debt asset when needed, settles the
/// loan and forwards the discount to the owner as profit.
///
/// The host forbids contract re-entry, so this contract cannot request the
/// flash loan itself (the pool's callback would re-enter it). The owner arms
/// it with `plan_liquidation` and then invokes `flash_loan` on the pool
/// directly, naming this contract as the receiver.
#[contract]
pub struct FlashLiquidator;

#[contractimpl]
impl FlashLiquidator {
    pub fn initialize(
        env: Env,
        owner: Address,
        flash_source: Address,
        debt_market: Address,
        collateral_market: Address,
        swap_adapter: Option<Address>,
    ) {
        if env
            .storage()
            .persistent()
            .get::<_, Address>(&DataKey::Owner)
            .is_some()
        {
            panic!("ALREADY_INITIALIZED");
        }
        owner.require_auth();
        // Flash-borrowing from the market being liquidated would re-enter it
        if flash_source == debt_market {
            panic!("INVALID_FLASH_SOURCE");
        }
        env.storage().persistent().set(&DataKey::Owner, &owner);
        env.storage()
            .persistent()
            .set(&DataKey::FlashSource, &flash_source);
        env.storage()
            .persistent()
            .set(&DataKey::DebtMarket, &debt_market);
        env.storage()
            .persistent()
            .set(&DataKey::CollateralMarket, &collateral_market);
        if let Some(adapter) = swap_adapter {
            env.storage()
                .persistent()
                .set(&DataKey::SwapAdapter, &adapter);
        }
    }

    pub fn get_owner(env: Env) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::Owner)
            .expect("owner not set")
    }

    /// Owner: arm the contract for one liquidation. The flash loan itself
    /// is requested from the pool by the owner, with this contract as the
    /// receiver.
    pub fn plan_liquidation(env: Env, borrower: Address, repay_amount: u128) {
        let owner = Self::get_owner(env.clone());
        owner.require_auth();
        env.storage()
            .persistent()
            .set(&DataKey::PlannedBorrower, &borrower);
        env.storage()
            .persistent()
            .set(&DataKey::PlannedRepay, &repay_amount);
    }

    /// Flash loan callback; refused unless a matching plan is armed.
    pub fn on_flash_loan(env: Env, from: Address, amount: u128, fee: u128, _data: Bytes) {
        let flash_source: Address = env
            .storage()
            .persistent()
            .get(&DataKey::FlashSource)
            .expect("flash source not set");
        let planned: Option<Address> = env.storage().persistent().get(&DataKey::PlannedBorrower);
        let Some(borrower) = planned else {
            panic!("UNEXPECTED_FLASH_LOAN");
        };
        if from != flash_source {
            panic!("UNEXPECTED_FLASH_LOAN");
        }
        let repay_amount: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::PlannedRepay)
            .expect("planned repay missing");
        if amount != repay_amount {
            panic!("UNEXPECTED_FLASH_LOAN");
        }
        env.storage().persistent().remove(&DataKey::PlannedBorrower);
        env.storage().persistent().remove(&DataKey::PlannedRepay);

        let debt_market: Address = env
            .storage()
            .persistent()
            .get(&DataKey::DebtMarket)
            .expect("debt market not set");
        let collateral_market: Address = env
            .storage()
            .persistent()
            .get(&DataKey::CollateralMarket)
            .expect("collateral market not set");
        let debt = MarketClient::new(&env, &debt_market);
        let collateral = MarketClient::new(&env, &collateral_market);
        let debt_token = debt.get_underlying_token();

        // The debt market pulls the repayment from us mid-call
        authorize_token_pull(&env, &debt_token, &debt_market, repay_amount);
        debt.liquidate_borrow(
            &env.current_contract_address(),
            &borrower,
            &repay_amount,
            &collateral_market,
        );

        // Turn the seized gTokens back into underlying collateral
        let seized = collateral.get_gtoken_balance(&env.current_contract_address());
        collateral.redeem(&env.current_contract_address(), &seized);

        let collateral_token = collateral.get_underlying_token();
        if collateral_token != debt_token {
            let adapter: Address = match env.storage().persistent().get(&DataKey::SwapAdapter) {
                Some(addr) => addr,
                None => panic!("SWAP_REQUIRED"),
            };
            let in_balance_i = token::Client::new(&env, &collateral_token)
                .balance(&env.current_contract_address());
            let in_balance: u128 = if in_balance_i > 0 {
                in_balance_i as u128
            } else {
                0
            };
            authorize_token_pull(&env, &collateral_token, &adapter, in_balance);
            let min_out = amount.saturating_add(fee);
            let _out: u128 = SwapAdapterClient::new(&env, &adapter).swap(
                &env.current_contract_address(),
                &collateral_token,
                &debt_token,
                &in_balance,
                &min_out,
            );
        }

        // Settle the loan; the source checks its own balance after this
        // callback unwinds
        let debt_token_client = token::Client::new(&env, &debt_token);
        let repay_total = amount.saturating_add(fee);
        debt_token_client.transfer(
            &env.current_contract_address(),
            &from,
            &(repay_total as i128),
        );

        // Whatever debt asset is left is the owner's profit
        let owner = Self::get_owner(env.clone());
        let profit_i = debt_token_client.balance(&env.current_contract_address());
        let profit: u128 = if profit_i > 0 { profit_i as u128 } else { 0 };
        if profit > 0 {
            debt_token_client.transfer(&env.current_contract_address(), &owner, &profit_i);
        }

        LiquidationExecuted {
            borrower,
            repay_amount,
            profit,
        }
        .publish(&env);
    }
}

/// Pre-authorize `spender` pulling `amount` of `token` from this contract
/// within the next outgoing call.
fn authorize_token_pull(env: &Env, token: &Address, spender: &Address, amount: u128) {
    let args = (
        env.current_contract_address(),
        spender.clone(),
        amount as i128,
    )
        .into_val(env);
    let mut auths = Vec::new(env);
    auths.push_back(InvokerContractAuthEntry::Contract(SubContractInvocation {
        context: ContractContext {
            contract: token.clone(),
            fn_name: Symbol::new(env, "transfer"),
            args,
        },
        sub_invocations: Vec::new(env),
    }));
    env.authorize_as_current_contract(auths);
}
