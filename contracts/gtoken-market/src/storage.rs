use soroban_sdk::{contracttype, Address, Env};

// Storage key types for the contract
#[contracttype]
pub enum DataKey {
    UnderlyingToken,
    Admin,                        // Address
    Comptroller,                  // Address (optional until wired)
    ExchangeRateScaled,           // u128 scaled 1e6, fixed at initialization
    Balances(Address),            // u128 gToken balance per account
    TotalSupply,                  // u128 gTokens issued
    Allowances(Address, Address), // u128 (owner, spender)
    BorrowBalances(Address),      // u128 underlying owed per account
    TotalBorrows,                 // u128
    TotalReserves,                // u128 underlying accrued from flash-loan fees
    FlashLoanFeeScaled,           // u128 scaled 1e6, defaults 0
    Initialized,                  // bool flag to prevent re-initialization
}

/// This market's view of one account, handed to the comptroller with every
/// hook that walks account liquidity. The comptroller must not call back
/// into the market whose frame is live, so the market supplies its own
/// balances up front. Field layout matches the comptroller's type.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketSnapshot {
    pub underlying: Address,
    pub gtoken_balance: u128,
    pub borrow_balance: u128,
    pub exchange_rate: u128,
}

pub const SCALE_1E6: u128 = 1_000_000u128;

// Comptroller hook codes this market translates into named rejections
pub const ERR_PRICE: u32 = 1;
pub const ERR_INSUFFICIENT_SHORTFALL: u32 = 4;
pub const ERR_TOO_MUCH_REPAY: u32 = 5;

pub fn ensure_initialized(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::UnderlyingToken)
        .expect("market not initialized")
}

pub fn require_comptroller(env: &Env) -> Address {
    match env.storage().persistent().get(&DataKey::Comptroller) {
        Some(addr) => addr,
        None => panic!("COMPTROLLER_NOT_SET"),
    }
}

pub fn gtoken_balance(env: &Env, addr: &Address) -> u128 {
    env.storage()
        .persistent()
        .get(&DataKey::Balances(addr.clone()))
        .unwrap_or(0u128)
}

pub fn set_gtoken_balance(env: &Env, addr: &Address, amount: u128) {
    env.storage()
        .persistent()
        .set(&DataKey::Balances(addr.clone()), &amount);
}

pub fn borrow_balance(env: &Env, addr: &Address) -> u128 {
    env.storage()
        .persistent()
        .get(&DataKey::BorrowBalances(addr.clone()))
        .unwrap_or(0u128)
}

pub fn set_borrow_balance(env: &Env, addr: &Address, amount: u128) {
    if amount == 0 {
        env.storage()
            .persistent()
            .remove(&DataKey::BorrowBalances(addr.clone()));
    } else {
        env.storage()
            .persistent()
            .set(&DataKey::BorrowBalances(addr.clone()), &amount);
    }
}

pub fn to_i128(amount: u128) -> i128 {
    if amount > i128::MAX as u128 {
        panic!("amount exceeds i128");
    }
    amount as i128
}
