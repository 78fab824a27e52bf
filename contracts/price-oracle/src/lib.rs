#![no_std]
use soroban_sdk::{contract, contractevent, contractimpl, contracttype, Address, Env};

#[contracttype]
pub enum DataKey {
    Admin,
    Decimals,       // u32, price scale exponent
    Price(Address), // u128 per underlying asset, scaled 10^Decimals
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PricePosted {
    #[topic]
    pub asset: Address,
    pub price: u128,
}

/// Admin-seeded price feed. Prices are USD per whole token scaled by
/// 10^decimals; decimal differences between underlyings are folded into the
/// configured price so that `amount * price / 10^decimals` is comparable
/// across assets.
#[contract]
pub struct PriceOracle;

#[contractimpl]
impl PriceOracle {
    pub fn initialize(env: Env, admin: Address, decimals: u32) {
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
        env.storage().persistent().set(&DataKey::Decimals, &decimals);
    }

    /// Admin: post the price for an underlying asset.
    pub fn set_underlying_price(env: Env, asset: Address, price: u128) {
        let admin: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Admin)
            .expect("admin not set");
        admin.require_auth();
        if price == 0 {
            panic!("INVALID_PRICE");
        }
        env.storage()
            .persistent()
            .set(&DataKey::Price(asset.clone()), &price);
        PricePosted { asset, price }.publish(&env);
    }

    /// Price of an underlying asset, if posted. Consumers treat a missing
    /// price as a hard failure, never as zero.
    pub fn get_underlying_price(env: Env, asset: Address) -> Option<u128> {
        env.storage().persistent().get(&DataKey::Price(asset))
    }

    pub fn decimals(env: Env) -> u32 {
        env.storage()
            .persistent()
            .get(&DataKey::Decimals)
            .unwrap_or(6u32)
    }

    pub fn get_admin(env: Env) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::Admin)
            .expect("admin not set")
    }
}
