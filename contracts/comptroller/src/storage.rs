use soroban_sdk::{contracttype, Address, Env};

// Storage key types for the contract
#[contracttype]
pub enum DataKey {
    Admin,
    Oracle,                     // Address
    SupportedMarkets,           // Map<Address, bool>
    UserMarkets(Address),       // Vec<Address>
    MarketCF(Address),          // u128 scaled 1e6, unset counts as 0
    CloseFactorScaled,          // u128 scaled 1e6
    LiquidationIncentiveScaled, // u128 scaled 1e6
    ProtocolSeizeShareScaled,   // u128 scaled 1e6, share of seized gTokens held back
    ReserveRecipient,           // Address receiving held-back seizure gTokens
}

/// Balances of the calling market, passed along with every hook that needs a
/// liquidity walk. The comptroller never invokes the market that is calling
/// it (the host forbids re-entry), so the caller supplies its own view.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketSnapshot {
    pub underlying: Address,
    pub gtoken_balance: u128,
    pub borrow_balance: u128,
    pub exchange_rate: u128,
}

// Hook error codes. 0 is "allowed"; markets translate nonzero codes into
// their named rejection identifiers.
pub const NO_ERROR: u32 = 0;
pub const ERR_PRICE: u32 = 1;
pub const ERR_MARKET_NOT_LISTED: u32 = 2;
pub const ERR_INSUFFICIENT_LIQUIDITY: u32 = 3;
pub const ERR_INSUFFICIENT_SHORTFALL: u32 = 4;
pub const ERR_TOO_MUCH_REPAY: u32 = 5;

pub const SCALE_1E6: u128 = 1_000_000u128;

pub fn require_admin(env: &Env) {
    let admin: Address = env
        .storage()
        .persistent()
        .get(&DataKey::Admin)
        .expect("admin not set");
    admin.require_auth();
}

pub fn pow10_u128(decimals: u32) -> u128 {
    // conservative pow that avoids overflow for reasonable decimals (<= 20)
    let mut result: u128 = 1;
    let mut i = 0u32;
    while i < decimals {
        result = result.saturating_mul(10);
        i += 1;
    }
    result
}
