//! Client interface for price adaptors (Reflector-style feeds).

use soroban_sdk::{contractclient, contracttype, Address, Env};

#[contracttype(export = false)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PriceData {
    pub price: i128,
    pub timestamp: u64,
}

#[contractclient(name = "PriceAdaptorClient")]
pub trait PriceAdaptor {
    /// Most recent quote for the asset, or `None` when the feed has
    /// never published one.
    fn lastprice(env: Env, asset: Address) -> Option<PriceData>;

    /// Decimals of the quoted price.
    fn decimals(env: Env) -> u32;
}
