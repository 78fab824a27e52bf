use soroban_sdk::{contract, contractimpl, token, Address, Bytes, Env, IntoVal, Symbol};

use crate::events::*;
use crate::risk::RiskHubClient;
use crate::storage::*;

#[contract]
pub struct GTokenMarket;

#[contractimpl]
impl GTokenMarket {
    /// Initialize the market with its underlying token, a fixed exchange
    /// rate (scaled 1e6, 1_000_000 = 1:1) and an admin.
    pub fn initialize(env: Env, token_address: Address, exchange_rate_scaled: u128, admin: Address) {
        let storage = env.storage().persistent();
        if storage
            .get::<_, bool>(&DataKey::Initialized)
            .unwrap_or(false)
        {
            panic!("ALREADY_INITIALIZED");
        }
        admin.require_auth();
        if exchange_rate_scaled == 0 {
            panic!("INVALID_EXCHANGE_RATE");
        }
        storage.set(&DataKey::Initialized, &true);
        storage.set(&DataKey::UnderlyingToken, &token_address);
        storage.set(&DataKey::ExchangeRateScaled, &exchange_rate_scaled);
        storage.set(&DataKey::Admin, &admin);
        storage.set(&DataKey::TotalSupply, &0u128);
        storage.set(&DataKey::TotalBorrows, &0u128);
        storage.set(&DataKey::TotalReserves, &0u128);
        storage.set(&DataKey::FlashLoanFeeScaled, &0u128);
    }

    /// Admin: wire the comptroller that authorizes every mutation. Probes
    /// the listing interface so a wrong address fails here, not mid-mint.
    pub fn set_comptroller(env: Env, comptroller: Address) {
        let _ = ensure_initialized(&env);
        require_admin(&env);
        let hub = RiskHubClient::new(&env, &comptroller);
        let _: bool = hub.is_listed(&env.current_contract_address());
        env.storage()
            .persistent()
            .set(&DataKey::Comptroller, &comptroller);
        NewComptroller { comptroller }.publish(&env);
    }

    pub fn get_comptroller(env: Env) -> Option<Address> {
        env.storage().persistent().get(&DataKey::Comptroller)
    }

    /// Deposit underlying and receive gTokens at the fixed exchange rate.
    pub fn mint(env: Env, user: Address, amount: u128) {
        let token_address = ensure_initialized(&env);
        user.require_auth();
        let comp = require_comptroller(&env);
        let hub = RiskHubClient::new(&env, &comp);
        let code = hub.mint_allowed(&env.current_contract_address(), &user, &amount);
        if code != 0 {
            panic!("MINT_NOT_ALLOWED");
        }

        let rate = Self::get_exchange_rate(env.clone());
        let gtokens_to_mint = amount
            .checked_mul(SCALE_1E6)
            .expect("mint calculation overflow")
            / rate;
        if gtokens_to_mint == 0 {
            panic!("MINT_AMOUNT_TOO_SMALL");
        }

        // Pull the deposit; the market never assumes push transfers
        let token_client = token::Client::new(&env, &token_address);
        if token_client
            .try_transfer(&user, &env.current_contract_address(), &to_i128(amount))
            .is_err()
        {
            panic!("INSUFFICIENT_ALLOWANCE");
        }

        set_gtoken_balance(&env, &user, gtoken_balance(&env, &user) + gtokens_to_mint);
        let total: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::TotalSupply)
            .unwrap_or(0u128);
        env.storage()
            .persistent()
            .set(&DataKey::TotalSupply, &(total + gtokens_to_mint));

        Mint {
            minter: user,
            mint_amount: amount,
            mint_tokens: gtokens_to_mint,
        }
        .publish(&env);
    }

    /// Burn gTokens and withdraw the corresponding underlying.
    pub fn redeem(env: Env, user: Address, gtoken_amount: u128) {
        let token_address = ensure_initialized(&env);
        user.require_auth();
        let comp = require_comptroller(&env);

        let current_gtokens = gtoken_balance(&env, &user);
        if current_gtokens < gtoken_amount {
            panic!("INSUFFICIENT_GTOKENS");
        }

        let hub = RiskHubClient::new(&env, &comp);
        let code = hub.redeem_allowed(
            &env.current_contract_address(),
            &user,
            &gtoken_amount,
            &Self::snapshot_for(&env, &user),
        );
        if code == ERR_PRICE {
            panic!("PRICE_ERROR");
        }
        if code != 0 {
            panic!("REDEEM_NOT_ALLOWED");
        }

        let rate = Self::get_exchange_rate(env.clone());
        let underlying_to_return = gtoken_amount
            .checked_mul(rate)
            .expect("redeem calculation overflow")
            / SCALE_1E6;

        // Borrowed-out funds are not available for withdrawal
        if Self::get_cash(env.clone()) < underlying_to_return {
            panic!("INSUFFICIENT_CASH");
        }

        set_gtoken_balance(&env, &user, current_gtokens - gtoken_amount);
        let total: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::TotalSupply)
            .unwrap_or(0u128);
        env.storage()
            .persistent()
            .set(&DataKey::TotalSupply, &(total - gtoken_amount));

        let token_client = token::Client::new(&env, &token_address);
        token_client.transfer(
            &env.current_contract_address(),
            &user,
            &to_i128(underlying_to_return),
        );

        Redeem {
            redeemer: user,
            redeem_amount: underlying_to_return,
            redeem_tokens: gtoken_amount,
        }
        .publish(&env);
    }

    /// Borrow underlying against collateral held across entered markets.
    pub fn borrow(env: Env, user: Address, amount: u128) {
        let token_address = ensure_initialized(&env);
        user.require_auth();
        let comp = require_comptroller(&env);
        let hub = RiskHubClient::new(&env, &comp);
        let code = hub.borrow_allowed(
            &env.current_contract_address(),
            &user,
            &amount,
            &Self::snapshot_for(&env, &user),
        );
        if code == ERR_PRICE {
            panic!("PRICE_ERROR");
        }
        if code != 0 {
            panic!("BORROW_NOT_ALLOWED");
        }

        if Self::get_cash(env.clone()) < amount {
            panic!("INSUFFICIENT_CASH");
        }

        let account_borrows = borrow_balance(&env, &user) + amount;
        set_borrow_balance(&env, &user, account_borrows);
        let total_borrows: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::TotalBorrows)
            .unwrap_or(0u128)
            + amount;
        env.storage()
            .persistent()
            .set(&DataKey::TotalBorrows, &total_borrows);

        let token_client = token::Client::new(&env, &token_address);
        token_client.transfer(&env.current_contract_address(), &user, &to_i128(amount));

        BorrowEvent {
            borrower: user,
            borrow_amount: amount,
            account_borrows,
            total_borrows,
        }
        .publish(&env);
    }

    /// Repay the caller's own borrow.
    pub fn repay(env: Env, user: Address, amount: u128) {
        user.require_auth();
        Self::repay_internal(&env, &user, &user, amount);
    }

    /// Repay someone else's borrow; the payer funds it.
    pub fn repay_on_behalf(env: Env, payer: Address, borrower: Address, amount: u128) {
        payer.require_auth();
        Self::repay_internal(&env, &payer, &borrower, amount);
    }

    fn repay_internal(env: &Env, payer: &Address, borrower: &Address, amount: u128) {
        let token_address = ensure_initialized(env);
        let comp = require_comptroller(env);
        let hub = RiskHubClient::new(env, &comp);
        let code = hub.repay_allowed(&env.current_contract_address(), payer, borrower, &amount);
        if code != 0 {
            panic!("REPAY_NOT_ALLOWED");
        }

        let current_debt = borrow_balance(env, borrower);
        // Overpayment is rejected, not silently refunded
        if amount > current_debt {
            panic!("REPAY_AMOUNT_TOO_HIGH");
        }

        let token_client = token::Client::new(env, &token_address);
        if token_client
            .try_transfer(payer, &env.current_contract_address(), &to_i128(amount))
            .is_err()
        {
            panic!("INSUFFICIENT_ALLOWANCE");
        }

        let account_borrows = current_debt - amount;
        set_borrow_balance(env, borrower, account_borrows);
        let total_borrows: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::TotalBorrows)
            .unwrap_or(0u128)
            .saturating_sub(amount);
        env.storage()
            .persistent()
            .set(&DataKey::TotalBorrows, &total_borrows);

        RepayBorrow {
            payer: payer.clone(),
            borrower: borrower.clone(),
            repay_amount: amount,
            account_borrows,
            total_borrows,
        }
        .publish(env);
    }

    /// Liquidate an undercollateralized borrower: repay part of their debt
    /// in this market and seize discounted collateral gTokens from
    /// `collateral_market`. Repay and seizure land atomically or not at all.
    pub fn liquidate_borrow(
        env: Env,
        liquidator: Address,
        borrower: Address,
        repay_amount: u128,
        collateral_market: Address,
    ) {
        let token_address = ensure_initialized(&env);
        liquidator.require_auth();
        if liquidator == borrower {
            panic!("LIQUIDATE_LIQUIDATOR_IS_BORROWER");
        }
        if repay_amount == 0 {
            panic!("INVALID_REPAY_AMOUNT");
        }
        let comp = require_comptroller(&env);
        let hub = RiskHubClient::new(&env, &comp);
        let snap = Self::snapshot_for(&env, &borrower);

        let code = hub.liquidate_allowed(
            &env.current_contract_address(),
            &collateral_market,
            &borrower,
            &repay_amount,
            &snap,
        );
        match code {
            0 => {}
            ERR_PRICE => panic!("PRICE_ERROR"),
            ERR_INSUFFICIENT_SHORTFALL => panic!("INSUFFICIENT_SHORTFALL"),
            ERR_TOO_MUCH_REPAY => panic!("TOO_MUCH_REPAY"),
            _ => panic!("LIQUIDATE_NOT_ALLOWED"),
        }

        // Repay on the borrower's behalf, funded by the liquidator
        let token_client = token::Client::new(&env, &token_address);
        if token_client
            .try_transfer(
                &liquidator,
                &env.current_contract_address(),
                &to_i128(repay_amount),
            )
            .is_err()
        {
            panic!("INSUFFICIENT_ALLOWANCE");
        }
        let account_borrows = borrow_balance(&env, &borrower).saturating_sub(repay_amount);
        set_borrow_balance(&env, &borrower, account_borrows);
        let total_borrows: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::TotalBorrows)
            .unwrap_or(0u128)
            .saturating_sub(repay_amount);
        env.storage()
            .persistent()
            .set(&DataKey::TotalBorrows, &total_borrows);
        RepayBorrow {
            payer: liquidator.clone(),
            borrower: borrower.clone(),
            repay_amount,
            account_borrows,
            total_borrows,
        }
        .publish(&env);

        let (seize_tokens, fee_tokens) = hub.liquidate_calculate_seize(
            &env.current_contract_address(),
            &collateral_market,
            &repay_amount,
            &snap,
        );

        if collateral_market == env.current_contract_address() {
            // A contract cannot invoke itself; listing of both sides was
            // already checked by liquidate_allowed
            Self::seize_internal(&env, &hub, &liquidator, &borrower, seize_tokens, fee_tokens);
        } else {
            let _: () = env.invoke_contract(
                &collateral_market,
                &Symbol::new(&env, "seize"),
                (
                    env.current_contract_address(),
                    liquidator.clone(),
                    borrower.clone(),
                    seize_tokens,
                    fee_tokens,
                )
                    .into_val(&env),
            );
        }

        LiquidateBorrow {
            liquidator,
            borrower,
            repay_amount,
            collateral_market,
            seize_tokens,
        }
        .publish(&env);
    }

    /// Forced collateral transfer during liquidation, callable only by a
    /// sibling market listed in the same comptroller. Bypasses
    /// `transfer_allowed`: the point of seizure is reducing over-leverage.
    pub fn seize(
        env: Env,
        seizer_market: Address,
        liquidator: Address,
        borrower: Address,
        seize_tokens: u128,
        fee_tokens: u128,
    ) {
        let _ = ensure_initialized(&env);
        seizer_market.require_auth();
        let comp = require_comptroller(&env);
        let hub = RiskHubClient::new(&env, &comp);
        let code = hub.seize_allowed(&env.current_contract_address(), &seizer_market);
        if code != 0 {
            panic!("SEIZE_NOT_ALLOWED");
        }
        Self::seize_internal(&env, &hub, &liquidator, &borrower, seize_tokens, fee_tokens);
    }

    fn seize_internal(
        env: &Env,
        hub: &RiskHubClient,
        liquidator: &Address,
        borrower: &Address,
        seize_tokens: u128,
        fee_tokens: u128,
    ) {
        let borrower_bal = gtoken_balance(env, borrower);
        if borrower_bal < seize_tokens {
            panic!("LIQUIDATE_SEIZE_TOO_MUCH");
        }
        let liquidator_tokens = seize_tokens.saturating_sub(fee_tokens);
        set_gtoken_balance(env, borrower, borrower_bal - seize_tokens);
        set_gtoken_balance(
            env,
            liquidator,
            gtoken_balance(env, liquidator) + liquidator_tokens,
        );
        Transfer {
            from: borrower.clone(),
            to: liquidator.clone(),
            amount: liquidator_tokens,
        }
        .publish(env);
        if fee_tokens > 0 {
            // Held-back share of the seizure accrues to the protocol
            let recipient = hub.get_reserve_recipient();
            set_gtoken_balance(env, &recipient, gtoken_balance(env, &recipient) + fee_tokens);
            Transfer {
                from: borrower.clone(),
                to: recipient,
                amount: fee_tokens,
            }
            .publish(env);
        }
    }

    // gToken transfers, gated by the comptroller like a redeem
    pub fn transfer(env: Env, from: Address, to: Address, amount: u128) {
        from.require_auth();
        Self::transfer_internal(&env, &from, &to, amount);
    }

    pub fn approve(env: Env, owner: Address, spender: Address, amount: u128) {
        let _ = ensure_initialized(&env);
        owner.require_auth();
        env.storage()
            .persistent()
            .set(&DataKey::Allowances(owner.clone(), spender.clone()), &amount);
        Approval {
            owner,
            spender,
            amount,
        }
        .publish(&env);
    }

    pub fn allowance(env: Env, owner: Address, spender: Address) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::Allowances(owner, spender))
            .unwrap_or(0u128)
    }

    pub fn transfer_from(env: Env, spender: Address, from: Address, to: Address, amount: u128) {
        spender.require_auth();
        let allowed = Self::allowance(env.clone(), from.clone(), spender.clone());
        if allowed < amount {
            panic!("INSUFFICIENT_ALLOWANCE");
        }
        env.storage()
            .persistent()
            .set(&DataKey::Allowances(from.clone(), spender), &(allowed - amount));
        Self::transfer_internal(&env, &from, &to, amount);
    }

    fn transfer_internal(env: &Env, from: &Address, to: &Address, amount: u128) {
        let _ = ensure_initialized(env);
        if amount == 0 {
            return;
        }
        let comp = require_comptroller(env);
        let hub = RiskHubClient::new(env, &comp);
        let code = hub.transfer_allowed(
            &env.current_contract_address(),
            from,
            to,
            &amount,
            &Self::snapshot_for(env, from),
        );
        if code == ERR_PRICE {
            panic!("PRICE_ERROR");
        }
        if code != 0 {
            panic!("TRANSFER_NOT_ALLOWED");
        }
        let from_bal = gtoken_balance(env, from);
        if from_bal < amount {
            panic!("INSUFFICIENT_GTOKENS");
        }
        set_gtoken_balance(env, from, from_bal - amount);
        set_gtoken_balance(env, to, gtoken_balance(env, to) + amount);
        Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        }
        .publish(env);
    }

    /// Lend `amount` of cash to `receiver` for the duration of the call.
    /// The receiver must return principal plus fee before its callback
    /// unwinds; the fee accrues to reserves.
    pub fn flash_loan(env: Env, receiver: Address, amount: u128, data: Bytes) {
        let token_address = ensure_initialized(&env);
        if amount == 0 {
            panic!("INVALID_FLASH_AMOUNT");
        }
        if Self::get_cash(env.clone()) < amount {
            panic!("INSUFFICIENT_CASH");
        }
        let fee_scaled: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::FlashLoanFeeScaled)
            .unwrap_or(0u128);
        let fee = (amount.saturating_mul(fee_scaled)) / SCALE_1E6;

        let token_client = token::Client::new(&env, &token_address);
        let balance_before = Self::get_cash(env.clone());
        token_client.transfer(&env.current_contract_address(), &receiver, &to_i128(amount));

        let _: () = env.invoke_contract(
            &receiver,
            &Symbol::new(&env, "on_flash_loan"),
            (env.current_contract_address(), amount, fee, data).into_val(&env),
        );

        let balance_after = Self::get_cash(env.clone());
        if balance_after < balance_before.saturating_add(fee) {
            panic!("FLASH_LOAN_NOT_REPAID");
        }
        let fee_paid = balance_after - balance_before;
        if fee_paid > 0 {
            let reserves: u128 = env
                .storage()
                .persistent()
                .get(&DataKey::TotalReserves)
                .unwrap_or(0u128);
            env.storage()
                .persistent()
                .set(&DataKey::TotalReserves, &reserves.saturating_add(fee_paid));
        }
        FlashLoan {
            receiver,
            amount,
            fee_paid,
        }
        .publish(&env);
    }

    /// Admin: set flash loan fee (0..=1e6, applied to principal)
    pub fn set_flash_loan_fee(env: Env, fee_scaled: u128) {
        let _ = ensure_initialized(&env);
        require_admin(&env);
        if fee_scaled > SCALE_1E6 {
            panic!("INVALID_FLASH_LOAN_FEE");
        }
        env.storage()
            .persistent()
            .set(&DataKey::FlashLoanFeeScaled, &fee_scaled);
        NewFlashLoanFee {
            fee_mantissa: fee_scaled,
        }
        .publish(&env);
    }

    pub fn get_flash_loan_fee(env: Env) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::FlashLoanFeeScaled)
            .unwrap_or(0u128)
    }

    /// Admin: withdraw accrued underlying reserves to the admin.
    pub fn reduce_reserves(env: Env, amount: u128) {
        let token_address = ensure_initialized(&env);
        require_admin(&env);
        let reserves: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::TotalReserves)
            .unwrap_or(0u128);
        if amount > reserves || amount > Self::get_cash(env.clone()) {
            panic!("INSUFFICIENT_RESERVES");
        }
        let updated = reserves - amount;
        env.storage()
            .persistent()
            .set(&DataKey::TotalReserves, &updated);
        let admin: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Admin)
            .expect("admin not set");
        let token_client = token::Client::new(&env, &token_address);
        token_client.transfer(&env.current_contract_address(), &admin, &to_i128(amount));
        ReservesReduced {
            reduce_amount: amount,
            total_reserves: updated,
        }
        .publish(&env);
    }

    pub fn get_total_reserves(env: Env) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::TotalReserves)
            .unwrap_or(0u128)
    }

    // Views
    pub fn get_underlying_token(env: Env) -> Address {
        ensure_initialized(&env)
    }

    pub fn get_gtoken_balance(env: Env, user: Address) -> u128 {
        gtoken_balance(&env, &user)
    }

    pub fn get_total_gtokens(env: Env) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::TotalSupply)
            .unwrap_or(0u128)
    }

    pub fn get_borrow_balance(env: Env, user: Address) -> u128 {
        borrow_balance(&env, &user)
    }

    pub fn get_total_borrows(env: Env) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::TotalBorrows)
            .unwrap_or(0u128)
    }

    /// Underlying held by the market and available for redeems, borrows and
    /// flash loans.
    pub fn get_cash(env: Env) -> u128 {
        let token_address = ensure_initialized(&env);
        let bal = token::Client::new(&env, &token_address)
            .balance(&env.current_contract_address());
        if bal < 0 {
            0u128
        } else {
            bal as u128
        }
    }

    /// The fixed gToken/underlying exchange rate, scaled 1e6.
    pub fn get_exchange_rate(env: Env) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::ExchangeRateScaled)
            .unwrap_or(SCALE_1E6)
    }

    pub fn get_admin(env: Env) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::Admin)
            .expect("admin not set")
    }

    /// Admin: transfer admin to a new address
    pub fn set_admin(env: Env, new_admin: Address) {
        let _ = ensure_initialized(&env);
        require_admin(&env);
        env.storage().persistent().set(&DataKey::Admin, &new_admin);
        NewAdmin { admin: new_admin }.publish(&env);
    }

    /// Admin: upgrade contract code
    pub fn upgrade_wasm(env: Env, new_wasm_hash: soroban_sdk::BytesN<32>) {
        let _ = ensure_initialized(&env);
        require_admin(&env);
        env.deployer().update_current_contract_wasm(new_wasm_hash);
    }

    fn snapshot_for(env: &Env, user: &Address) -> MarketSnapshot {
        MarketSnapshot {
            underlying: ensure_initialized(env),
            gtoken_balance: gtoken_balance(env, user),
            borrow_balance: borrow_balance(env, user),
            exchange_rate: Self::get_exchange_rate(env.clone()),
        }
    }
}

fn require_admin(env: &Env) {
    let admin: Address = env
        .storage()
        .persistent()
        .get(&DataKey::Admin)
        .expect("admin not set");
    admin.require_auth();
}
