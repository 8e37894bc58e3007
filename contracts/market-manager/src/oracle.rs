//! Price lookups against the oracle router.

use soroban_sdk::{contracttype, Address, Env, IntoVal, Symbol};

/// Mirror of the router's answer type. A flagged quote still carries the
/// best price the router could salvage; the policy for reacting to the
/// flag lives here, not in the router.
#[contracttype(export = false)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PriceQuote {
    pub price: u128, // 1e18 scale
    pub had_error: bool,
}

pub fn price_of(env: &Env, router: &Address, asset: &Address) -> PriceQuote {
    env.invoke_contract(
        router,
        &Symbol::new(env, "get_price"),
        (asset.clone(),).into_val(env),
    )
}
