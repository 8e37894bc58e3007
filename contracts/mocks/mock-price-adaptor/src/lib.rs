#![no_std]
use soroban_sdk::{contract, contractimpl, contracttype, Address, Env};

#[contracttype]
pub enum DataKey {
    Decimals,
    Price(Address),
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PriceData {
    pub price: i128,
    pub timestamp: u64,
}

/// Test stand-in for a price adaptor. Quotes are set directly; the
/// timestamp defaults to the current ledger time so freshly set prices
/// always pass staleness checks.
#[contract]
pub struct MockPriceAdaptor;

#[contractimpl]
impl MockPriceAdaptor {
    pub fn initialize(env: Env, decimals: u32) {
        env.storage().persistent().set(&DataKey::Decimals, &decimals);
    }

    pub fn set_price(env: Env, asset: Address, price: i128) {
        let data = PriceData {
            price,
            timestamp: env.ledger().timestamp(),
        };
        env.storage().persistent().set(&DataKey::Price(asset), &data);
    }

    pub fn set_price_at(env: Env, asset: Address, price: i128, timestamp: u64) {
        let data = PriceData { price, timestamp };
        env.storage().persistent().set(&DataKey::Price(asset), &data);
    }

    pub fn clear_price(env: Env, asset: Address) {
        env.storage().persistent().remove(&DataKey::Price(asset));
    }

    pub fn lastprice(env: Env, asset: Address) -> Option<PriceData> {
        env.storage().persistent().get(&DataKey::Price(asset))
    }

    pub fn decimals(env: Env) -> u32 {
        env.storage().persistent().get(&DataKey::Decimals).unwrap_or(14)
    }
}
