#![cfg(test)]
use super::*;
use comptroller as ct;
use price_oracle as po;
use soroban_sdk::{
    contract, contractimpl, contracttype, testutils::Address as _, token, Address, Bytes, Env,
};

// One whole token at the 7-decimal convention used throughout the tests
const UNIT: u128 = 10_000_000;
// $1 at the oracle's 6-decimal price scale
const USD: u128 = 1_000_000;

fn create_test_token<'a>(
    env: &'a Env,
    admin: &Address,
) -> (Address, token::Client<'a>, token::StellarAssetClient<'a>) {
    let contract_address = env
        .register_stellar_asset_contract_v2(admin.clone())
        .address();
    (
        contract_address.clone(),
        token::Client::new(env, &contract_address),
        token::StellarAssetClient::new(env, &contract_address),
    )
}

// Two listed markets wired to a comptroller and oracle:
// (admin, comptroller, oracle, token_a, token_b, market_a, market_b)
fn setup_protocol(env: &Env) -> (Address, Address, Address, Address, Address, Address, Address) {
    let admin = Address::generate(env);
    let (token_a, _, _) = create_test_token(env, &admin);
    let (token_b, _, _) = create_test_token(env, &admin);

    let market_a_id = env.register(GTokenMarket, ());
    GTokenMarketClient::new(env, &market_a_id).initialize(&token_a, &1_000_000u128, &admin);
    let market_b_id = env.register(GTokenMarket, ());
    GTokenMarketClient::new(env, &market_b_id).initialize(&token_b, &1_000_000u128, &admin);

    let comp_id = env.register(ct::Comptroller, ());
    let comp = ct::ComptrollerClient::new(env, &comp_id);
    comp.initialize(&admin);

    let oracle_id = env.register(po::PriceOracle, ());
    po::PriceOracleClient::new(env, &oracle_id).initialize(&admin, &6u32);
    comp.set_oracle(&oracle_id);

    GTokenMarketClient::new(env, &market_a_id).set_comptroller(&comp_id);
    GTokenMarketClient::new(env, &market_b_id).set_comptroller(&comp_id);
    comp.support_market(&market_a_id);
    comp.support_market(&market_b_id);

    (admin, comp_id, oracle_id, token_a, token_b, market_a_id, market_b_id)
}

// The reference position from the deployment suite: A at $1, B at $100 with
// a 70% collateral factor, user_a borrowing 50 A against 1 B.
fn setup_basic_borrow(
    env: &Env,
) -> (
    Address, // admin
    Address, // comptroller
    Address, // token_a
    Address, // market_a
    Address, // market_b
    Address, // user_a (borrower)
    Address, // user_b (supplier / liquidator)
) {
    let (admin, comp_id, oracle_id, token_a, token_b, market_a_id, market_b_id) =
        setup_protocol(env);
    let comp = ct::ComptrollerClient::new(env, &comp_id);
    let oracle = po::PriceOracleClient::new(env, &oracle_id);

    oracle.set_underlying_price(&token_a, &USD);
    oracle.set_underlying_price(&token_b, &(100 * USD));
    comp.set_collateral_factor(&market_b_id, &700_000u128);

    let user_a = Address::generate(env);
    let user_b = Address::generate(env);
    comp.enter_markets(&user_a, &soroban_sdk::vec![env, market_a_id.clone(), market_b_id.clone()]);
    comp.enter_markets(&user_b, &soroban_sdk::vec![env, market_a_id.clone(), market_b_id.clone()]);

    token::StellarAssetClient::new(env, &token_b).mint(&user_a, &(UNIT as i128));
    token::StellarAssetClient::new(env, &token_a).mint(&user_b, &((50 * UNIT) as i128));

    GTokenMarketClient::new(env, &market_b_id).mint(&user_a, &UNIT);
    GTokenMarketClient::new(env, &market_a_id).mint(&user_b, &(50 * UNIT));
    GTokenMarketClient::new(env, &market_a_id).borrow(&user_a, &(50 * UNIT));

    (admin, comp_id, token_a, market_a_id, market_b_id, user_a, user_b)
}

#[test]
fn test_initialize() {
    let env = Env::default();
    env.mock_all_auths();

    let admin = Address::generate(&env);
    let (token_address, _, _) = create_test_token(&env, &admin);

    let market_id = env.register(GTokenMarket, ());
    let market = GTokenMarketClient::new(&env, &market_id);
    market.initialize(&token_address, &1_000_000u128, &admin);

    assert_eq!(market.get_underlying_token(), token_address);
    assert_eq!(market.get_exchange_rate(), 1_000_000u128);
    assert_eq!(market.get_total_gtokens(), 0u128);
    assert_eq!(market.get_total_borrows(), 0u128);
    assert_eq!(market.get_admin(), admin);
    assert_eq!(market.get_comptroller(), None);
}

#[test]
#[should_panic(expected = "ALREADY_INITIALIZED")]
fn test_initialize_twice_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let admin = Address::generate(&env);
    let (token_address, _, _) = create_test_token(&env, &admin);
    let market_id = env.register(GTokenMarket, ());
    let market = GTokenMarketClient::new(&env, &market_id);
    market.initialize(&token_address, &1_000_000u128, &admin);
    market.initialize(&token_address, &1_000_000u128, &admin);
}

#[test]
#[should_panic(expected = "INVALID_EXCHANGE_RATE")]
fn test_initialize_zero_rate_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let admin = Address::generate(&env);
    let (token_address, _, _) = create_test_token(&env, &admin);
    let market_id = env.register(GTokenMarket, ());
    GTokenMarketClient::new(&env, &market_id).initialize(&token_address, &0u128, &admin);
}

#[test]
#[should_panic(expected = "COMPTROLLER_NOT_SET")]
fn test_mint_requires_comptroller() {
    let env = Env::default();
    env.mock_all_auths();

    let admin = Address::generate(&env);
    let user = Address::generate(&env);
    let (token_address, _, token_admin) = create_test_token(&env, &admin);
    token_admin.mint(&user, &((100 * UNIT) as i128));

    let market_id = env.register(GTokenMarket, ());
    let market = GTokenMarketClient::new(&env, &market_id);
    market.initialize(&token_address, &1_000_000u128, &admin);
    market.mint(&user, &(100 * UNIT));
}

#[test]
fn test_mint_and_redeem_round_trip() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _oracle, token_a, _tb, market_a_id, _mb) = setup_protocol(&env);
    let market = GTokenMarketClient::new(&env, &market_a_id);
    let token_client = token::Client::new(&env, &token_a);
    let user = Address::generate(&env);
    token::StellarAssetClient::new(&env, &token_a).mint(&user, &((100 * UNIT) as i128));

    market.mint(&user, &(100 * UNIT));
    assert_eq!(token_client.balance(&user), 0);
    assert_eq!(token_client.balance(&market_a_id), (100 * UNIT) as i128);
    assert_eq!(market.get_gtoken_balance(&user), 100 * UNIT);
    assert_eq!(market.get_total_gtokens(), 100 * UNIT);

    market.redeem(&user, &(100 * UNIT));
    assert_eq!(token_client.balance(&user), (100 * UNIT) as i128);
    assert_eq!(token_client.balance(&market_a_id), 0);
    assert_eq!(market.get_gtoken_balance(&user), 0);
    assert_eq!(market.get_total_gtokens(), 0);
}

#[test]
#[should_panic(expected = "MINT_NOT_ALLOWED")]
fn test_mint_into_unlisted_market_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (admin, comp_id, _oracle, _ta, _tb, _ma, _mb) = setup_protocol(&env);
    // A market wired to the comptroller but never listed
    let (token_c, _, token_c_admin) = create_test_token(&env, &admin);
    let market_c_id = env.register(GTokenMarket, ());
    let market_c = GTokenMarketClient::new(&env, &market_c_id);
    market_c.initialize(&token_c, &1_000_000u128, &admin);
    market_c.set_comptroller(&comp_id);

    let user = Address::generate(&env);
    token_c_admin.mint(&user, &(UNIT as i128));
    market_c.mint(&user, &UNIT);
}

#[test]
#[should_panic(expected = "INSUFFICIENT_ALLOWANCE")]
fn test_mint_without_funds_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _oracle, _ta, _tb, market_a_id, _mb) = setup_protocol(&env);
    let pauper = Address::generate(&env);
    GTokenMarketClient::new(&env, &market_a_id).mint(&pauper, &UNIT);
}

#[test]
#[should_panic(expected = "INSUFFICIENT_GTOKENS")]
fn test_redeem_more_than_held_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _oracle, token_a, _tb, market_a_id, _mb) = setup_protocol(&env);
    let market = GTokenMarketClient::new(&env, &market_a_id);
    let user = Address::generate(&env);
    token::StellarAssetClient::new(&env, &token_a).mint(&user, &(UNIT as i128));
    market.mint(&user, &UNIT);
    market.redeem(&user, &(2 * UNIT));
}

#[test]
#[should_panic(expected = "INSUFFICIENT_CASH")]
fn test_redeem_borrowed_out_cash_panics() {
    let env = Env::default();
    env.mock_all_auths();

    // user_a borrowed 50 of the 50 A supplied, so user_b cannot redeem
    let (_admin, _comp, _ta, market_a_id, _mb, _user_a, user_b) = setup_basic_borrow(&env);
    GTokenMarketClient::new(&env, &market_a_id).redeem(&user_b, &(50 * UNIT));
}

#[test]
#[should_panic(expected = "REDEEM_NOT_ALLOWED")]
fn test_redeem_collateral_backing_a_borrow_panics() {
    let env = Env::default();
    env.mock_all_auths();

    // user_a's 1 B backs a 50 A borrow; pulling it would leave a shortfall
    let (_admin, _comp, _ta, _ma, market_b_id, user_a, _ub) = setup_basic_borrow(&env);
    GTokenMarketClient::new(&env, &market_b_id).redeem(&user_a, &UNIT);
}

#[test]
fn test_borrow_and_repay() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, token_a, market_a_id, _mb, user_a, _ub) = setup_basic_borrow(&env);
    let market_a = GTokenMarketClient::new(&env, &market_a_id);

    assert_eq!(market_a.get_borrow_balance(&user_a), 50 * UNIT);
    assert_eq!(market_a.get_total_borrows(), 50 * UNIT);
    assert_eq!(market_a.get_cash(), 0);

    market_a.repay(&user_a, &(50 * UNIT));
    assert_eq!(market_a.get_borrow_balance(&user_a), 0);
    assert_eq!(market_a.get_total_borrows(), 0);
    assert_eq!(market_a.get_cash(), 50 * UNIT);
    assert_eq!(token::Client::new(&env, &token_a).balance(&user_a), 0);
}

#[test]
#[should_panic(expected = "BORROW_NOT_ALLOWED")]
fn test_borrow_without_collateral_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _ta, market_a_id, _mb, _user_a, user_b) = setup_basic_borrow(&env);
    // user_b has supplied A but holds no priced collateral factor weight:
    // their only collateral is market A, whose factor was never set
    GTokenMarketClient::new(&env, &market_a_id).borrow(&user_b, &UNIT);
}

#[test]
#[should_panic(expected = "INSUFFICIENT_CASH")]
fn test_borrow_more_than_cash_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, comp_id, oracle_id, token_a, token_b, market_a_id, market_b_id) =
        setup_protocol(&env);
    let comp = ct::ComptrollerClient::new(&env, &comp_id);
    let oracle = po::PriceOracleClient::new(&env, &oracle_id);
    oracle.set_underlying_price(&token_a, &USD);
    oracle.set_underlying_price(&token_b, &(100 * USD));
    comp.set_collateral_factor(&market_b_id, &700_000u128);

    let user = Address::generate(&env);
    comp.enter_markets(&user, &soroban_sdk::vec![&env, market_b_id.clone()]);
    token::StellarAssetClient::new(&env, &token_b).mint(&user, &(UNIT as i128));
    GTokenMarketClient::new(&env, &market_b_id).mint(&user, &UNIT);

    // $70 of headroom but market A holds no cash at all
    GTokenMarketClient::new(&env, &market_a_id).borrow(&user, &(10 * UNIT));
}

#[test]
#[should_panic(expected = "REPAY_AMOUNT_TOO_HIGH")]
fn test_repay_more_than_owed_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, token_a, market_a_id, _mb, user_a, _ub) = setup_basic_borrow(&env);
    // Give the borrower more than their debt and try to overpay
    token::StellarAssetClient::new(&env, &token_a).mint(&user_a, &((10 * UNIT) as i128));
    GTokenMarketClient::new(&env, &market_a_id).repay(&user_a, &(51 * UNIT));
}

#[test]
fn test_repay_on_behalf() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, token_a, market_a_id, _mb, user_a, _ub) = setup_basic_borrow(&env);
    let market_a = GTokenMarketClient::new(&env, &market_a_id);

    let payer = Address::generate(&env);
    token::StellarAssetClient::new(&env, &token_a).mint(&payer, &((20 * UNIT) as i128));
    market_a.repay_on_behalf(&payer, &user_a, &(20 * UNIT));

    assert_eq!(market_a.get_borrow_balance(&user_a), 30 * UNIT);
    assert_eq!(token::Client::new(&env, &token_a).balance(&payer), 0);
}

#[test]
fn test_transfer_and_allowance() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _oracle, token_a, _tb, market_a_id, _mb) = setup_protocol(&env);
    let market = GTokenMarketClient::new(&env, &market_a_id);
    let user = Address::generate(&env);
    let other = Address::generate(&env);
    let spender = Address::generate(&env);
    token::StellarAssetClient::new(&env, &token_a).mint(&user, &((10 * UNIT) as i128));
    market.mint(&user, &(10 * UNIT));

    market.transfer(&user, &other, &(4 * UNIT));
    assert_eq!(market.get_gtoken_balance(&user), 6 * UNIT);
    assert_eq!(market.get_gtoken_balance(&other), 4 * UNIT);

    market.approve(&user, &spender, &(3 * UNIT));
    assert_eq!(market.allowance(&user, &spender), 3 * UNIT);
    market.transfer_from(&spender, &user, &other, &(2 * UNIT));
    assert_eq!(market.allowance(&user, &spender), UNIT);
    assert_eq!(market.get_gtoken_balance(&user), 4 * UNIT);
    assert_eq!(market.get_gtoken_balance(&other), 6 * UNIT);
}

#[test]
#[should_panic(expected = "INSUFFICIENT_ALLOWANCE")]
fn test_transfer_from_over_allowance_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _oracle, token_a, _tb, market_a_id, _mb) = setup_protocol(&env);
    let market = GTokenMarketClient::new(&env, &market_a_id);
    let user = Address::generate(&env);
    let other = Address::generate(&env);
    let spender = Address::generate(&env);
    token::StellarAssetClient::new(&env, &token_a).mint(&user, &((10 * UNIT) as i128));
    market.mint(&user, &(10 * UNIT));

    market.approve(&user, &spender, &UNIT);
    market.transfer_from(&spender, &user, &other, &(2 * UNIT));
}

#[test]
#[should_panic(expected = "TRANSFER_NOT_ALLOWED")]
fn test_transfer_of_encumbered_collateral_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _ta, _ma, market_b_id, user_a, user_b) = setup_basic_borrow(&env);
    // Moving the collateral away is the same as redeeming it
    GTokenMarketClient::new(&env, &market_b_id).transfer(&user_a, &user_b, &UNIT);
}

#[test]
fn test_liquidate_seizes_discounted_collateral() {
    let env = Env::default();
    env.mock_all_auths();

    let (admin, comp_id, token_a, market_a_id, market_b_id, user_a, user_b) =
        setup_basic_borrow(&env);
    let comp = ct::ComptrollerClient::new(&env, &comp_id);
    let market_a = GTokenMarketClient::new(&env, &market_a_id);
    let market_b = GTokenMarketClient::new(&env, &market_b_id);

    // Push the borrower under water: 100 * 0.3 - 50 = -20
    comp.set_collateral_factor(&market_b_id, &300_000u128);

    // Half the 50 A debt can be closed per call
    let repay = 25 * UNIT;
    token::StellarAssetClient::new(&env, &token_a).mint(&user_b, &(repay as i128));

    assert_eq!(market_b.get_gtoken_balance(&user_a), UNIT);
    assert_eq!(market_b.get_gtoken_balance(&user_b), 0);

    market_a.liquidate_borrow(&user_b, &user_a, &repay, &market_b_id);

    // seize = 25 * 1.08 * 1 / (100 * 1) = 0.27 B gTokens; the liquidator
    // keeps 97.2% of it, the held-back 2.8% goes to the reserve recipient
    assert_eq!(market_b.get_gtoken_balance(&user_a), 7_300_000u128);
    assert_eq!(market_b.get_gtoken_balance(&user_b), 2_624_400u128);
    assert_eq!(market_b.get_gtoken_balance(&admin), 75_600u128);

    // Debt came down by exactly the repaid amount
    assert_eq!(market_a.get_borrow_balance(&user_a), repay);

    // Remaining position: 0.73 * 100 * 0.3 - 25 = -3.1
    let (error, liquidity, shortfall) = comp.get_account_liquidity(&user_a);
    assert_eq!(error, 0);
    assert_eq!(liquidity, 0);
    assert_eq!(shortfall, 31_000_000u128);
}

#[test]
fn test_liquidate_seize_too_much_reverts_whole_call() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, comp_id, token_a, market_a_id, market_b_id, user_a, user_b) =
        setup_basic_borrow(&env);
    let comp = ct::ComptrollerClient::new(&env, &comp_id);
    let market_a = GTokenMarketClient::new(&env, &market_a_id);

    comp.set_collateral_factor(&market_b_id, &300_000u128);
    let repay = 25 * UNIT;
    token::StellarAssetClient::new(&env, &token_a).mint(&user_b, &(repay as i128));

    // user_a holds no A gTokens, so seizing 27 of them must fail...
    assert_eq!(market_a.get_gtoken_balance(&user_a), 0);
    let result = market_a.try_liquidate_borrow(&user_b, &user_a, &repay, &market_a_id);
    assert!(result.is_err());

    // ...and the repay leg must have been unwound with it
    assert_eq!(market_a.get_borrow_balance(&user_a), 50 * UNIT);
    assert_eq!(
        token::Client::new(&env, &token_a).balance(&user_b),
        repay as i128
    );
}

#[test]
#[should_panic(expected = "LIQUIDATE_SEIZE_TOO_MUCH")]
fn test_liquidate_seize_too_much_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, comp_id, token_a, market_a_id, market_b_id, user_a, user_b) =
        setup_basic_borrow(&env);
    let comp = ct::ComptrollerClient::new(&env, &comp_id);

    comp.set_collateral_factor(&market_b_id, &300_000u128);
    let repay = 25 * UNIT;
    token::StellarAssetClient::new(&env, &token_a).mint(&user_b, &(repay as i128));

    GTokenMarketClient::new(&env, &market_a_id).liquidate_borrow(
        &user_b, &user_a, &repay, &market_a_id,
    );
}

#[test]
fn test_liquidate_same_market_collateral() {
    let env = Env::default();
    env.mock_all_auths();

    let (admin, comp_id, token_a, market_a_id, market_b_id, user_a, user_b) =
        setup_basic_borrow(&env);
    let comp = ct::ComptrollerClient::new(&env, &comp_id);
    let market_a = GTokenMarketClient::new(&env, &market_a_id);

    comp.set_collateral_factor(&market_b_id, &300_000u128);

    // Give the borrower 27 A gTokens so the seizure can be satisfied in the
    // debt market itself
    token::StellarAssetClient::new(&env, &token_a).mint(&user_a, &((27 * UNIT) as i128));
    market_a.mint(&user_a, &(27 * UNIT));
    assert_eq!(market_a.get_gtoken_balance(&user_a), 27 * UNIT);
    assert_eq!(market_a.get_gtoken_balance(&user_b), 50 * UNIT);

    let repay = 25 * UNIT;
    token::StellarAssetClient::new(&env, &token_a).mint(&user_b, &(repay as i128));
    market_a.liquidate_borrow(&user_b, &user_a, &repay, &market_a_id);

    // seize = 25 * 1.08 * 1 / (1 * 1) = 27 A gTokens
    assert_eq!(market_a.get_gtoken_balance(&user_a), 0);
    assert_eq!(market_a.get_gtoken_balance(&user_b), 762_440_000u128);
    assert_eq!(market_a.get_gtoken_balance(&admin), 7_560_000u128);

    // 100 * 0.3 - 25 = 5 of headroom is restored
    let (error, liquidity, shortfall) = comp.get_account_liquidity(&user_a);
    assert_eq!(error, 0);
    assert_eq!(liquidity, 5 * UNIT);
    assert_eq!(shortfall, 0);
}

#[test]
#[should_panic(expected = "INSUFFICIENT_SHORTFALL")]
fn test_liquidate_healthy_account_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, token_a, market_a_id, market_b_id, user_a, user_b) =
        setup_basic_borrow(&env);
    // Position is healthy: liquidity 20, shortfall 0
    let repay = 25 * UNIT;
    token::StellarAssetClient::new(&env, &token_a).mint(&user_b, &(repay as i128));
    GTokenMarketClient::new(&env, &market_a_id).liquidate_borrow(
        &user_b, &user_a, &repay, &market_b_id,
    );
}

#[test]
#[should_panic(expected = "TOO_MUCH_REPAY")]
fn test_liquidate_over_close_factor_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, comp_id, token_a, market_a_id, market_b_id, user_a, user_b) =
        setup_basic_borrow(&env);
    ct::ComptrollerClient::new(&env, &comp_id).set_collateral_factor(&market_b_id, &300_000u128);

    // The close factor caps a single call at 50 * 0.5 = 25
    let repay = 30 * UNIT;
    token::StellarAssetClient::new(&env, &token_a).mint(&user_b, &(repay as i128));
    GTokenMarketClient::new(&env, &market_a_id).liquidate_borrow(
        &user_b, &user_a, &repay, &market_b_id,
    );
}

#[test]
#[should_panic(expected = "LIQUIDATE_LIQUIDATOR_IS_BORROWER")]
fn test_self_liquidation_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _ta, market_a_id, market_b_id, user_a, _ub) = setup_basic_borrow(&env);
    GTokenMarketClient::new(&env, &market_a_id).liquidate_borrow(
        &user_a,
        &user_a,
        &(25 * UNIT),
        &market_b_id,
    );
}

#[test]
#[should_panic(expected = "SEIZE_NOT_ALLOWED")]
fn test_seize_from_unlisted_seizer_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _ta, _ma, market_b_id, user_a, user_b) = setup_basic_borrow(&env);
    let rogue = Address::generate(&env);
    GTokenMarketClient::new(&env, &market_b_id).seize(
        &rogue,
        &user_b,
        &user_a,
        &1_000u128,
        &0u128,
    );
}

// Flash loan receiver that returns principal plus fee
#[contract]
pub struct FlashLoanRepayer;

#[contracttype]
#[derive(Clone)]
enum ReceiverDataKey {
    Underlying,
}

#[contractimpl]
impl FlashLoanRepayer {
    pub fn configure(env: Env, underlying: Address) {
        env.storage()
            .persistent()
            .set(&ReceiverDataKey::Underlying, &underlying);
    }

    pub fn on_flash_loan(env: Env, market: Address, amount: u128, fee: u128, _data: Bytes) {
        let token_address: Address = env
            .storage()
            .persistent()
            .get(&ReceiverDataKey::Underlying)
            .expect("underlying not set");
        let repay_total = amount + fee;
        token::Client::new(&env, &token_address).transfer(
            &env.current_contract_address(),
            &market,
            &(repay_total as i128),
        );
    }
}

// Flash loan receiver that keeps the fee for itself
#[contract]
pub struct FlashLoanRenegade;

#[contractimpl]
impl FlashLoanRenegade {
    pub fn configure(env: Env, underlying: Address) {
        env.storage()
            .persistent()
            .set(&ReceiverDataKey::Underlying, &underlying);
    }

    pub fn on_flash_loan(env: Env, market: Address, amount: u128, _fee: u128, _data: Bytes) {
        let token_address: Address = env
            .storage()
            .persistent()
            .get(&ReceiverDataKey::Underlying)
            .expect("underlying not set");
        token::Client::new(&env, &token_address).transfer(
            &env.current_contract_address(),
            &market,
            &(amount as i128),
        );
    }
}

#[test]
fn test_flash_loan_fee_accrues_to_reserves() {
    let env = Env::default();
    env.mock_all_auths();

    let (admin, _comp, _oracle, token_a, _tb, market_a_id, _mb) = setup_protocol(&env);
    let market = GTokenMarketClient::new(&env, &market_a_id);
    let token_admin = token::StellarAssetClient::new(&env, &token_a);

    let supplier = Address::generate(&env);
    token_admin.mint(&supplier, &((100 * UNIT) as i128));
    market.mint(&supplier, &(100 * UNIT));

    // 5% premium
    market.set_flash_loan_fee(&50_000u128);

    let receiver_id = env.register(FlashLoanRepayer, ());
    FlashLoanRepayerClient::new(&env, &receiver_id).configure(&token_a);
    // Fund the receiver so it can cover the fee
    token_admin.mint(&receiver_id, &(UNIT as i128));

    market.flash_loan(&receiver_id, &(10 * UNIT), &Bytes::new(&env));

    let fee = 10 * UNIT * 50_000 / 1_000_000;
    assert_eq!(market.get_total_reserves(), fee);
    assert_eq!(market.get_cash(), 100 * UNIT + fee);

    // Admin can sweep the accrued fee
    market.reduce_reserves(&fee);
    assert_eq!(market.get_total_reserves(), 0);
    assert_eq!(
        token::Client::new(&env, &token_a).balance(&admin),
        fee as i128
    );
}

#[test]
#[should_panic(expected = "FLASH_LOAN_NOT_REPAID")]
fn test_flash_loan_missing_fee_panics() {
    let env = Env::default();
    env.mock_all_auths();

    let (_admin, _comp, _oracle, token_a, _tb, market_a_id, _mb) = setup_protocol(&env);
    let market = GTokenMarketClient::new(&env, &market_a_id);

    let supplier = Address::generate(&env);
    token::StellarAssetClient::new(&env, &token_a).mint(&supplier, &((100 * UNIT) as i128));
    market.mint(&supplier, &(100 * UNIT));
    market.set_flash_loan_fee(&50_000u128);

    let receiver_id = env.register(FlashLoanRenegade, ());
    FlashLoanRenegadeClient::new(&env, &receiver_id).configure(&token_a);

    market.flash_loan(&receiver_id, &(10 * UNIT), &Bytes::new(&env));
}

#[test]
#[should_panic]
fn test_set_flash_loan_fee_requires_admin_auth() {
    let env = Env::default();
    // no mock_all_auths to enforce auth

    let admin = Address::generate(&env);
    let (token_address, _, _) = create_test_token(&env, &admin);
    let market_id = env.register(GTokenMarket, ());
    let market = GTokenMarketClient::new(&env, &market_id);
    env.mock_all_auths();
    market.initialize(&token_address, &1_000_000u128, &admin);
    env.set_auths(&[]);
    market.set_flash_loan_fee(&1_000u128);
}
