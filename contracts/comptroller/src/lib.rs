#![no_std]
use soroban_sdk::{contract, contractimpl, Address, Env, IntoVal, Map, Symbol, Vec};

mod events;
mod oracle;
mod storage;

use events::*;
pub use storage::{
    DataKey, MarketSnapshot, ERR_INSUFFICIENT_LIQUIDITY, ERR_INSUFFICIENT_SHORTFALL,
    ERR_MARKET_NOT_LISTED, ERR_PRICE, ERR_TOO_MUCH_REPAY, NO_ERROR,
};
use storage::{pow10_u128, require_admin, SCALE_1E6};

/// Simulated balance changes applied to one market during a liquidity walk.
/// The market itself is never invoked; its state comes from the snapshot the
/// caller passed in.
struct MarketEffects {
    market: Address,
    snapshot: MarketSnapshot,
    redeem_tokens: u128,
    borrow_amount: u128,
}

#[contract]
pub struct Comptroller;

#[contractimpl]
impl Comptroller {
    pub fn initialize(env: Env, admin: Address) {
        if env
            .storage()
            .persistent()
            .get::<_, Address>(&DataKey::Admin)
            .is_some()
        {
            panic!("ALREADY_INITIALIZED");
        }
        admin.require_auth();
        env.storage().persistent().set(&DataKey::Admin, &admin);
        let markets: Map<Address, bool> = Map::new(&env);
        env.storage()
            .persistent()
            .set(&DataKey::SupportedMarkets, &markets);
        // Defaults: 50% close factor, 1.08x liquidation incentive,
        // 2.8% protocol seize share
        env.storage()
            .persistent()
            .set(&DataKey::CloseFactorScaled, &500_000u128);
        env.storage()
            .persistent()
            .set(&DataKey::LiquidationIncentiveScaled, &1_080_000u128);
        env.storage()
            .persistent()
            .set(&DataKey::ProtocolSeizeShareScaled, &28_000u128);
        env.storage()
            .persistent()
            .set(&DataKey::ReserveRecipient, &admin);
    }

    // Admin transfer
    pub fn set_admin(env: Env, new_admin: Address) {
        require_admin(&env);
        env.storage().persistent().set(&DataKey::Admin, &new_admin);
        AdminUpdated {
            admin: new_admin.clone(),
        }
        .publish(&env);
    }

    pub fn get_admin(env: Env) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::Admin)
            .expect("admin not set")
    }

    pub fn set_oracle(env: Env, oracle: Address) {
        require_admin(&env);
        env.storage().persistent().set(&DataKey::Oracle, &oracle);
        OracleUpdated {
            oracle: oracle.clone(),
        }
        .publish(&env);
    }

    pub fn get_oracle(env: Env) -> Option<Address> {
        env.storage().persistent().get(&DataKey::Oracle)
    }

    pub fn upgrade_wasm(env: Env, new_wasm_hash: soroban_sdk::BytesN<32>) {
        require_admin(&env);
        env.deployer().update_current_contract_wasm(new_wasm_hash);
    }

    // Admin parameters
    pub fn set_close_factor(env: Env, close_factor_scaled: u128) {
        require_admin(&env);
        if close_factor_scaled == 0 || close_factor_scaled > SCALE_1E6 {
            panic!("INVALID_CLOSE_FACTOR");
        }
        env.storage()
            .persistent()
            .set(&DataKey::CloseFactorScaled, &close_factor_scaled);
        NewCloseFactor {
            close_factor_mantissa: close_factor_scaled,
        }
        .publish(&env);
    }

    pub fn get_close_factor(env: Env) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::CloseFactorScaled)
            .unwrap_or(500_000u128)
    }

    pub fn set_liquidation_incentive(env: Env, li_scaled: u128) {
        require_admin(&env);
        // The liquidator must never receive less collateral value than the
        // debt value repaid.
        if li_scaled < SCALE_1E6 {
            panic!("INVALID_LIQUIDATION_INCENTIVE");
        }
        env.storage()
            .persistent()
            .set(&DataKey::LiquidationIncentiveScaled, &li_scaled);
        NewLiquidationIncentive {
            incentive_mantissa: li_scaled,
        }
        .publish(&env);
    }

    pub fn get_liquidation_incentive(env: Env) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::LiquidationIncentiveScaled)
            .unwrap_or(1_080_000u128)
    }

    pub fn set_protocol_seize_share(env: Env, share_scaled: u128) {
        require_admin(&env);
        if share_scaled > SCALE_1E6 {
            panic!("INVALID_PROTOCOL_SEIZE_SHARE");
        }
        env.storage()
            .persistent()
            .set(&DataKey::ProtocolSeizeShareScaled, &share_scaled);
        NewProtocolSeizeShare {
            seize_share_mantissa: share_scaled,
        }
        .publish(&env);
    }

    pub fn get_protocol_seize_share(env: Env) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::ProtocolSeizeShareScaled)
            .unwrap_or(28_000u128)
    }

    pub fn set_reserve_recipient(env: Env, recipient: Address) {
        require_admin(&env);
        env.storage()
            .persistent()
            .set(&DataKey::ReserveRecipient, &recipient);
        NewReserveRecipient {
            recipient: recipient.clone(),
        }
        .publish(&env);
    }

    pub fn get_reserve_recipient(env: Env) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::ReserveRecipient)
            .expect("reserve recipient not set")
    }

    // Market listing
    pub fn support_market(env: Env, market: Address) {
        require_admin(&env);
        let mut markets: Map<Address, bool> = env
            .storage()
            .persistent()
            .get(&DataKey::SupportedMarkets)
            .unwrap_or(Map::new(&env));
        if markets.get(market.clone()).unwrap_or(false) {
            panic!("MARKET_ALREADY_LISTED");
        }
        markets.set(market.clone(), true);
        env.storage()
            .persistent()
            .set(&DataKey::SupportedMarkets, &markets);
        MarketListed { market }.publish(&env);
    }

    pub fn is_listed(env: Env, market: Address) -> bool {
        let markets: Map<Address, bool> = env
            .storage()
            .persistent()
            .get(&DataKey::SupportedMarkets)
            .unwrap_or(Map::new(&env));
        markets.get(market).unwrap_or(false)
    }

    pub fn set_collateral_factor(env: Env, market: Address, cf_scaled: u128) {
        require_admin(&env);
        if !Self::is_listed(env.clone(), market.clone()) {
            panic!("MARKET_NOT_LISTED");
        }
        if cf_scaled > SCALE_1E6 {
            panic!("INVALID_COLLATERAL_FACTOR");
        }
        env.storage()
            .persistent()
            .set(&DataKey::MarketCF(market.clone()), &cf_scaled);
        NewCollateralFactor {
            market,
            collateral_factor_mantissa: cf_scaled,
        }
        .publish(&env);
    }

    pub fn get_collateral_factor(env: Env, market: Address) -> u128 {
        // A factor never set counts for nothing
        env.storage()
            .persistent()
            .get(&DataKey::MarketCF(market))
            .unwrap_or(0u128)
    }

    // Account membership
    pub fn enter_markets(env: Env, user: Address, markets: Vec<Address>) {
        user.require_auth();
        for i in 0..markets.len() {
            let market = markets.get(i).unwrap();
            if !Self::is_listed(env.clone(), market.clone()) {
                panic!("MARKET_NOT_LISTED");
            }
            Self::add_to_market(&env, &user, &market);
        }
    }

    pub fn exit_market(env: Env, user: Address, market: Address) {
        user.require_auth();
        let gbal = market_gtoken_balance(&env, &market, &user);
        let debt = market_borrow_balance(&env, &market, &user);
        if gbal > 0 || debt > 0 {
            panic!("EXIT_MARKET_BALANCE_OWED");
        }
        let entered: Vec<Address> = env
            .storage()
            .persistent()
            .get(&DataKey::UserMarkets(user.clone()))
            .unwrap_or(Vec::new(&env));
        if entered.contains(market.clone()) {
            let mut remaining = Vec::new(&env);
            for i in 0..entered.len() {
                let m = entered.get(i).unwrap();
                if m != market {
                    remaining.push_back(m);
                }
            }
            env.storage()
                .persistent()
                .set(&DataKey::UserMarkets(user.clone()), &remaining);
        }
        MarketExited {
            account: user,
            market,
        }
        .publish(&env);
    }

    pub fn get_user_markets(env: Env, user: Address) -> Vec<Address> {
        env.storage()
            .persistent()
            .get(&DataKey::UserMarkets(user))
            .unwrap_or(Vec::new(&env))
    }

    // Admission hooks. Each returns 0 when the operation is allowed; the
    // calling market maps nonzero codes to its rejection identifiers.
    pub fn mint_allowed(env: Env, market: Address, _minter: Address, _amount: u128) -> u32 {
        if !Self::is_listed(env, market) {
            return ERR_MARKET_NOT_LISTED;
        }
        NO_ERROR
    }

    pub fn redeem_allowed(
        env: Env,
        market: Address,
        redeemer: Address,
        receipt_tokens: u128,
        snap: MarketSnapshot,
    ) -> u32 {
        if !Self::is_listed(env.clone(), market.clone()) {
            return ERR_MARKET_NOT_LISTED;
        }
        // Accounts that never entered the market have no liquidity riding
        // on it
        if !Self::get_user_markets(env.clone(), redeemer.clone()).contains(market.clone()) {
            return NO_ERROR;
        }
        let effects = MarketEffects {
            market,
            snapshot: snap,
            redeem_tokens: receipt_tokens,
            borrow_amount: 0,
        };
        match sum_positions(&env, &redeemer, Some(&effects)) {
            Err(code) => code,
            Ok((collateral_usd, borrow_usd)) => {
                if collateral_usd < borrow_usd {
                    ERR_INSUFFICIENT_LIQUIDITY
                } else {
                    NO_ERROR
                }
            }
        }
    }

    pub fn borrow_allowed(
        env: Env,
        market: Address,
        borrower: Address,
        amount: u128,
        snap: MarketSnapshot,
    ) -> u32 {
        // Only the market itself may trigger membership side effects
        market.require_auth();
        if !Self::is_listed(env.clone(), market.clone()) {
            return ERR_MARKET_NOT_LISTED;
        }
        Self::add_to_market(&env, &borrower, &market);
        let effects = MarketEffects {
            market,
            snapshot: snap,
            redeem_tokens: 0,
            borrow_amount: amount,
        };
        match sum_positions(&env, &borrower, Some(&effects)) {
            Err(code) => code,
            Ok((collateral_usd, borrow_usd)) => {
                if collateral_usd < borrow_usd {
                    ERR_INSUFFICIENT_LIQUIDITY
                } else {
                    NO_ERROR
                }
            }
        }
    }

    pub fn repay_allowed(
        env: Env,
        market: Address,
        _payer: Address,
        _borrower: Address,
        _amount: u128,
    ) -> u32 {
        if !Self::is_listed(env, market) {
            return ERR_MARKET_NOT_LISTED;
        }
        NO_ERROR
    }

    pub fn transfer_allowed(
        env: Env,
        market: Address,
        from: Address,
        _to: Address,
        receipt_tokens: u128,
        snap: MarketSnapshot,
    ) -> u32 {
        // Moving receipt tokens out is equivalent to redeeming them as far
        // as account health is concerned
        Self::redeem_allowed(env, market, from, receipt_tokens, snap)
    }

    pub fn seize_allowed(env: Env, collateral_market: Address, seizer_market: Address) -> u32 {
        if !Self::is_listed(env.clone(), collateral_market)
            || !Self::is_listed(env, seizer_market)
        {
            return ERR_MARKET_NOT_LISTED;
        }
        NO_ERROR
    }

    pub fn liquidate_allowed(
        env: Env,
        debt_market: Address,
        collateral_market: Address,
        borrower: Address,
        repay_amount: u128,
        snap: MarketSnapshot,
    ) -> u32 {
        if !Self::is_listed(env.clone(), debt_market.clone())
            || !Self::is_listed(env.clone(), collateral_market)
        {
            return ERR_MARKET_NOT_LISTED;
        }
        let effects = MarketEffects {
            market: debt_market,
            snapshot: snap.clone(),
            redeem_tokens: 0,
            borrow_amount: 0,
        };
        match sum_positions(&env, &borrower, Some(&effects)) {
            Err(code) => code,
            Ok((collateral_usd, borrow_usd)) => {
                if collateral_usd >= borrow_usd {
                    return ERR_INSUFFICIENT_SHORTFALL;
                }
                let close_factor = Self::get_close_factor(env);
                let max_repay = (snap.borrow_balance.saturating_mul(close_factor)) / SCALE_1E6;
                if repay_amount > max_repay {
                    return ERR_TOO_MUCH_REPAY;
                }
                NO_ERROR
            }
        }
    }

    /// Account liquidity across all entered markets, recomputed from current
    /// balances and oracle prices on every call: (error, liquidity,
    /// shortfall). A missing price for a market the account has a position
    /// in is a hard failure, reported as a nonzero error code.
    pub fn get_account_liquidity(env: Env, user: Address) -> (u32, u128, u128) {
        match sum_positions(&env, &user, None) {
            Err(code) => (code, 0u128, 0u128),
            Ok((collateral_usd, borrow_usd)) => {
                if collateral_usd >= borrow_usd {
                    (0u32, collateral_usd - borrow_usd, 0u128)
                } else {
                    (0u32, 0u128, borrow_usd - collateral_usd)
                }
            }
        }
    }

    /// Number of collateral gTokens a liquidation of `repay_amount` seizes,
    /// split into the liquidator's part and the protocol's held-back part:
    /// (seize_tokens, fee_tokens).
    ///
    /// seize = repay * incentive * price_debt / (price_collateral * rate)
    pub fn liquidate_calculate_seize(
        env: Env,
        debt_market: Address,
        collateral_market: Address,
        repay_amount: u128,
        snap: MarketSnapshot,
    ) -> (u128, u128) {
        let oracle_addr: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Oracle)
            .unwrap_or_else(|| panic!("PRICE_ERROR"));
        let feed = oracle::PriceFeedClient::new(&env, &oracle_addr);
        let scale = pow10_u128(feed.decimals());

        let price_debt = feed
            .get_underlying_price(&snap.underlying)
            .unwrap_or_else(|| panic!("PRICE_ERROR"));
        // The debt market may be the collateral market; its frame is still
        // live, so its view comes from the snapshot rather than a call back
        // into it.
        let (collateral_token, collateral_rate) = if collateral_market == debt_market {
            (snap.underlying.clone(), snap.exchange_rate)
        } else {
            (
                market_underlying(&env, &collateral_market),
                market_exchange_rate(&env, &collateral_market),
            )
        };
        let price_collateral = feed
            .get_underlying_price(&collateral_token)
            .unwrap_or_else(|| panic!("PRICE_ERROR"));

        let incentive = Self::get_liquidation_incentive(env.clone());
        let repay_usd = (repay_amount.saturating_mul(price_debt)) / scale;
        let seize_value_usd = (repay_usd.saturating_mul(incentive)) / SCALE_1E6;
        let seize_underlying = (seize_value_usd.saturating_mul(scale)) / price_collateral;
        let seize_tokens = (seize_underlying.saturating_mul(SCALE_1E6)) / collateral_rate;
        let share = Self::get_protocol_seize_share(env);
        let fee_tokens = (seize_tokens.saturating_mul(share)) / SCALE_1E6;
        (seize_tokens, fee_tokens)
    }

    fn add_to_market(env: &Env, user: &Address, market: &Address) {
        let mut entered: Vec<Address> = env
            .storage()
            .persistent()
            .get(&DataKey::UserMarkets(user.clone()))
            .unwrap_or(Vec::new(env));
        if !entered.contains(market.clone()) {
            entered.push_back(market.clone());
            env.storage()
                .persistent()
                .set(&DataKey::UserMarkets(user.clone()), &entered);
            MarketEntered {
                account: user.clone(),
                market: market.clone(),
            }
            .publish(env);
        }
    }
}

/// Walk the account's entered markets and price every position:
/// collateral += balance * rate * collateral_factor * price,
/// borrows += borrow_balance * price, all in USD at the oracle scale.
/// `effects` substitutes the supplied snapshot for one market (the one
/// whose frame is live on the call stack) and applies a simulated redeem
/// and/or borrow to it.
fn sum_positions(
    env: &Env,
    user: &Address,
    effects: Option<&MarketEffects>,
) -> Result<(u128, u128), u32> {
    let oracle_addr: Address = match env.storage().persistent().get(&DataKey::Oracle) {
        Some(addr) => addr,
        None => return Err(ERR_PRICE),
    };
    let feed = oracle::PriceFeedClient::new(env, &oracle_addr);
    let scale = pow10_u128(feed.decimals());

    let mut collateral_total: u128 = 0;
    let mut borrow_total: u128 = 0;
    let markets: Vec<Address> = env
        .storage()
        .persistent()
        .get(&DataKey::UserMarkets(user.clone()))
        .unwrap_or(Vec::new(env));
    for i in 0..markets.len() {
        let m = markets.get(i).unwrap();

        let (token, gbal, debt, rate) = match effects {
            Some(fx) if fx.market == m => (
                fx.snapshot.underlying.clone(),
                fx.snapshot.gtoken_balance.saturating_sub(fx.redeem_tokens),
                fx.snapshot.borrow_balance.saturating_add(fx.borrow_amount),
                fx.snapshot.exchange_rate,
            ),
            _ => (
                market_underlying(env, &m),
                market_gtoken_balance(env, &m, user),
                market_borrow_balance(env, &m, user),
                market_exchange_rate(env, &m),
            ),
        };
        if gbal == 0 && debt == 0 {
            continue;
        }
        let price = feed
            .get_underlying_price(&token)
            .ok_or(ERR_PRICE)?;

        if gbal > 0 {
            let cf: u128 = env
                .storage()
                .persistent()
                .get(&DataKey::MarketCF(m.clone()))
                .unwrap_or(0u128);
            let underlying_amount = (gbal.saturating_mul(rate)) / SCALE_1E6;
            let discounted = (underlying_amount.saturating_mul(cf)) / SCALE_1E6;
            let usd = (discounted.saturating_mul(price)) / scale;
            collateral_total = collateral_total.saturating_add(usd);
        }
        if debt > 0 {
            let usd = (debt.saturating_mul(price)) / scale;
            borrow_total = borrow_total.saturating_add(usd);
        }
    }
    Ok((collateral_total, borrow_total))
}

fn market_underlying(env: &Env, market: &Address) -> Address {
    env.invoke_contract(
        market,
        &Symbol::new(env, "get_underlying_token"),
        ().into_val(env),
    )
}

fn market_gtoken_balance(env: &Env, market: &Address, user: &Address) -> u128 {
    env.invoke_contract(
        market,
        &Symbol::new(env, "get_gtoken_balance"),
        (user.clone(),).into_val(env),
    )
}

fn market_borrow_balance(env: &Env, market: &Address, user: &Address) -> u128 {
    env.invoke_contract(
        market,
        &Symbol::new(env, "get_borrow_balance"),
        (user.clone(),).into_val(env),
    )
}

fn market_exchange_rate(env: &Env, market: &Address) -> u128 {
    env.invoke_contract(
        market,
        &Symbol::new(env, "get_exchange_rate"),
        ().into_val(env),
    )
}
