#![no_std]
use market_math::{mul_div_floor, SCALE_1E18};
use soroban_sdk::{
    contract, contractevent, contractimpl, contracttype, Address, BytesN, Env,
};

mod adaptor;
pub use adaptor::{PriceAdaptor, PriceAdaptorClient, PriceData};


const TTL_THRESHOLD: u32 = 100_000_000;
const TTL_EXTEND_TO: u32 = 200_000_000;

#[contracttype]
pub enum DataKey {
    Admin,
    Config(Address), // AdaptorConfig per asset
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdaptorConfig {
    pub primary: Address,
    pub secondary: Option<Address>,
    pub max_age_secs: u64,
    pub max_divergence: u128, // 1e18, relative to the lower quote
}

/// Cross-contract price answer. A flagged quote still carries the best
/// salvageable price so callers can value debt conservatively; how to
/// react to the flag is the caller's policy, the router never panics on
/// bad feed data.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PriceQuote {
    pub price: u128, // 1e18 scale
    pub had_error: bool,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdaptorConfigured {
    #[topic]
    pub asset: Address,
    pub primary: Address,
    pub secondary: Option<Address>,
    pub max_age_secs: u64,
    pub max_divergence: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewAdmin {
    #[topic]
    pub admin: Address,
}

struct AdaptorReading {
    price: u128,
    fresh: bool,
}

#[contract]
pub struct OracleRouter;

#[contractimpl]
impl OracleRouter {
    pub fn initialize(env: Env, admin: Address) {
        if env
            .storage()
            .persistent()
            .get::<_, Address>(&DataKey::Admin)
            .is_some()
        {
            panic!("already initialized");
        }
        admin.require_auth();
        env.storage().persistent().set(&DataKey::Admin, &admin);
        bump_ttl(&env);
    }

    /// Admin: route an asset through one or two adaptors. With a
    /// secondary configured, quotes are cross-checked and the lower one
    /// is served.
    pub fn set_adaptor(env: Env, asset: Address, config: AdaptorConfig) {
        require_admin(&env);
        if config.max_age_secs == 0 {
            panic!("invalid max age");
        }
        env.storage()
            .persistent()
            .set(&DataKey::Config(asset.clone()), &config);
        AdaptorConfigured {
            asset,
            primary: config.primary,
            secondary: config.secondary,
            max_age_secs: config.max_age_secs,
            max_divergence: config.max_divergence,
        }
        .publish(&env);
    }

    /// Price of one whole unit of the asset, 1e18 scale. `had_error` is
    /// set on any of: unconfigured asset, unreachable adaptor, missing or
    /// non-positive quote, staleness past `max_age_secs`, or divergence
    /// between the two adaptors beyond `max_divergence`.
    pub fn get_price(env: Env, asset: Address) -> PriceQuote {
        bump_ttl(&env);
        let Some(config) = env
            .storage()
            .persistent()
            .get::<_, AdaptorConfig>(&DataKey::Config(asset.clone()))
        else {
            return PriceQuote {
                price: 0,
                had_error: true,
            };
        };
        let now = env.ledger().timestamp();
        let primary = read_adaptor(&env, &config.primary, &asset, now, config.max_age_secs);
        let secondary = config
            .secondary
            .as_ref()
            .map(|a| read_adaptor(&env, a, &asset, now, config.max_age_secs));

        match secondary {
            None => PriceQuote {
                price: primary.price,
                had_error: !primary.fresh,
            },
            Some(second) => match (primary.fresh, second.fresh) {
                (true, true) => {
                    let low = primary.price.min(second.price);
                    let high = primary.price.max(second.price);
                    let divergence =
                        mul_div_floor(high - low, SCALE_1E18, low).unwrap_or(u128::MAX);
                    PriceQuote {
                        price: low,
                        had_error: divergence > config.max_divergence,
                    }
                }
                // One healthy feed: serve it, but flag the missing
                // cross-check.
                (true, false) => PriceQuote {
                    price: primary.price,
                    had_error: true,
                },
                (false, true) => PriceQuote {
                    price: second.price,
                    had_error: true,
                },
                (false, false) => PriceQuote {
                    price: primary.price,
                    had_error: true,
                },
            },
        }
    }

    pub fn adaptor_config(env: Env, asset: Address) -> Option<AdaptorConfig> {
        env.storage().persistent().get(&DataKey::Config(asset))
    }

    pub fn get_admin(env: Env) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::Admin)
            .unwrap_or_else(|| panic!("admin not set"))
    }

    pub fn set_admin(env: Env, new_admin: Address) {
        require_admin(&env);
        env.storage().persistent().set(&DataKey::Admin, &new_admin);
        NewAdmin { admin: new_admin }.publish(&env);
    }

    pub fn upgrade_wasm(env: Env, new_wasm_hash: BytesN<32>) {
        require_admin(&env);
        env.deployer().update_current_contract_wasm(new_wasm_hash);
    }
}

/// One adaptor round trip. `fresh` means the feed answered, the price is
/// positive, and the timestamp is within the staleness window; the price
/// itself is rescaled to 1e18 whenever the raw quote is usable at all.
fn read_adaptor(
    env: &Env,
    adaptor: &Address,
    asset: &Address,
    now: u64,
    max_age_secs: u64,
) -> AdaptorReading {
    let client = PriceAdaptorClient::new(env, adaptor);
    let data = match client.try_lastprice(asset) {
        Ok(Ok(Some(data))) => data,
        _ => {
            return AdaptorReading {
                price: 0,
                fresh: false,
            }
        }
    };
    if data.price <= 0 {
        return AdaptorReading {
            price: 0,
            fresh: false,
        };
    }
    let decimals = match client.try_decimals() {
        Ok(Ok(d)) => d,
        _ => {
            return AdaptorReading {
                price: 0,
                fresh: false,
            }
        }
    };
    let Some(scaled) = rescale(data.price as u128, decimals) else {
        return AdaptorReading {
            price: 0,
            fresh: false,
        };
    };
    let fresh = now.saturating_sub(data.timestamp) <= max_age_secs;
    AdaptorReading {
        price: scaled,
        fresh,
    }
}

fn rescale(price: u128, decimals: u32) -> Option<u128> {
    if decimals > 38 {
        return None;
    }
    let divisor = 10u128.checked_pow(decimals)?;
    mul_div_floor(price, SCALE_1E18, divisor)
}

fn require_admin(env: &Env) {
    let admin: Address = env
        .storage()
        .persistent()
        .get(&DataKey::Admin)
        .unwrap_or_else(|| panic!("admin not set"));
    bump_ttl(env);
    admin.require_auth();
}

fn bump_ttl(env: &Env) {
    let persistent = env.storage().persistent();
    if persistent.has(&DataKey::Admin) {
        persistent.extend_ttl(&DataKey::Admin, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}
