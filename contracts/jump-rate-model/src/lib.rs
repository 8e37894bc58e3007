#![no_std]
use market_math::{mul_div_floor, SCALE_1E18};
use soroban_sdk::{contract, contractevent, contractimpl, contracttype, Address, BytesN, Env};

/// Assumes 5-second ledger close times.
pub const LEDGERS_PER_YEAR: u128 = 6_307_200u128;
/// Hard per-ledger borrow rate ceiling (1e18 scale). Roughly 3150% APR;
/// anything above it is a configuration or oracle fault, not a market.
pub const MAX_BORROW_RATE: u128 = 5_000_000_000_000u128;

const TTL_THRESHOLD: u32 = 100_000_000;
const TTL_EXTEND_TO: u32 = 200_000_000;

#[contracttype]
pub enum DataKey {
    BaseRatePerLedger,       // u128 scaled 1e18
    MultiplierPerLedger,     // u128 scaled 1e18, slope below the kink
    JumpMultiplierPerLedger, // u128 scaled 1e18, slope above the kink
    Kink,                    // u128 scaled 1e18
    Admin,                   // Address
}

#[contract]
pub struct JumpRateModel;

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModelInitialized {
    pub base_rate_per_ledger: u128,
    pub multiplier_per_ledger: u128,
    pub jump_multiplier_per_ledger: u128,
    pub kink: u128,
}

#[contractimpl]
impl JumpRateModel {
    /// Parameters are quoted per year (1e18 scale) and stored per ledger.
    /// Rejects any configuration whose rate at full utilization would
    /// exceed the protocol ceiling; a model that can quote an unsafe rate
    /// must never deploy.
    pub fn initialize(
        env: Env,
        base_rate_per_year: u128,
        multiplier_per_year: u128,
        jump_multiplier_per_year: u128,
        kink: u128,
        admin: Address,
    ) {
        if env
            .storage()
            .persistent()
            .get::<_, Address>(&DataKey::Admin)
            .is_some()
        {
            panic!("already initialized");
        }
        if kink > SCALE_1E18 {
            panic!("invalid kink");
        }
        admin.require_auth();
        let base = base_rate_per_year / LEDGERS_PER_YEAR;
        let mult = multiplier_per_year / LEDGERS_PER_YEAR;
        let jump = jump_multiplier_per_year / LEDGERS_PER_YEAR;
        if rate_at(base, mult, jump, kink, SCALE_1E18) > MAX_BORROW_RATE {
            panic!("invalid rate params");
        }
        env.storage().persistent().set(&DataKey::Admin, &admin);
        env.storage()
            .persistent()
            .set(&DataKey::BaseRatePerLedger, &base);
        env.storage()
            .persistent()
            .set(&DataKey::MultiplierPerLedger, &mult);
        env.storage()
            .persistent()
            .set(&DataKey::JumpMultiplierPerLedger, &jump);
        env.storage().persistent().set(&DataKey::Kink, &kink);
        bump_ttl(&env);
        ModelInitialized {
            base_rate_per_ledger: base,
            multiplier_per_ledger: mult,
            jump_multiplier_per_ledger: jump,
            kink,
        }
        .publish(&env);
    }

    /// Per-ledger borrow rate (1e18). Continuous at the kink.
    pub fn get_borrow_rate(env: Env, cash: u128, borrows: u128, reserves: u128) -> u128 {
        ensure_initialized(&env);
        bump_ttl(&env);
        let util = Self::utilization(cash, borrows, reserves);
        let base: u128 = read(&env, &DataKey::BaseRatePerLedger);
        let mult: u128 = read(&env, &DataKey::MultiplierPerLedger);
        let jump: u128 = read(&env, &DataKey::JumpMultiplierPerLedger);
        let kink: u128 = read(&env, &DataKey::Kink);
        rate_at(base, mult, jump, kink, util)
    }

    /// Per-ledger supply rate: utilization times the borrow rate, net of
    /// the reserve factor cut.
    pub fn get_supply_rate(
        env: Env,
        cash: u128,
        borrows: u128,
        reserves: u128,
        reserve_factor: u128,
    ) -> u128 {
        let borrow_rate = Self::get_borrow_rate(env.clone(), cash, borrows, reserves);
        let one_minus_rf = SCALE_1E18.saturating_sub(reserve_factor);
        let rate_to_pool = mul_div_floor(borrow_rate, one_minus_rf, SCALE_1E18).unwrap_or(0);
        let util = Self::utilization(cash, borrows, reserves);
        mul_div_floor(util, rate_to_pool, SCALE_1E18).unwrap_or(0)
    }

    /// `borrows * 1e18 / (cash + borrows - reserves)`, zero when there is
    /// no debt or the denominator collapses.
    pub fn utilization(cash: u128, borrows: u128, reserves: u128) -> u128 {
        if borrows == 0 {
            return 0;
        }
        let denom = cash.saturating_add(borrows).saturating_sub(reserves);
        if denom == 0 {
            return 0;
        }
        mul_div_floor(borrows, SCALE_1E18, denom).unwrap_or(u128::MAX)
    }

    pub fn base_rate_per_ledger(env: Env) -> u128 {
        read(&env, &DataKey::BaseRatePerLedger)
    }

    pub fn multiplier_per_ledger(env: Env) -> u128 {
        read(&env, &DataKey::MultiplierPerLedger)
    }

    pub fn jump_multiplier_per_ledger(env: Env) -> u128 {
        read(&env, &DataKey::JumpMultiplierPerLedger)
    }

    pub fn kink(env: Env) -> u128 {
        read(&env, &DataKey::Kink)
    }

    pub fn upgrade_wasm(env: Env, admin: Address, new_wasm_hash: BytesN<32>) {
        require_admin(&env, &admin);
        env.deployer().update_current_contract_wasm(new_wasm_hash);
    }
}

fn rate_at(base: u128, mult: u128, jump: u128, kink: u128, util: u128) -> u128 {
    if util <= kink {
        base.saturating_add(mul_div_floor(util, mult, SCALE_1E18).unwrap_or(u128::MAX))
    } else {
        let normal =
            base.saturating_add(mul_div_floor(kink, mult, SCALE_1E18).unwrap_or(u128::MAX));
        let excess = util - kink;
        normal.saturating_add(mul_div_floor(excess, jump, SCALE_1E18).unwrap_or(u128::MAX))
    }
}

fn read(env: &Env, key: &DataKey) -> u128 {
    env.storage().persistent().get(key).unwrap_or(0)
}

fn ensure_initialized(env: &Env) {
    if env
        .storage()
        .persistent()
        .get::<_, Address>(&DataKey::Admin)
        .is_none()
    {
        panic!("model not initialized");
    }
}

fn require_admin(env: &Env, admin: &Address) {
    let stored: Address = env
        .storage()
        .persistent()
        .get(&DataKey::Admin)
        .unwrap_or_else(|| panic!("admin not set"));
    bump_ttl(env);
    if stored != *admin {
        panic!("not admin");
    }
    admin.require_auth();
}

fn bump_ttl(env: &Env) {
    let persistent = env.storage().persistent();
    if persistent.has(&DataKey::Admin) {
        persistent.extend_ttl(&DataKey::Admin, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::BaseRatePerLedger) {
        persistent.extend_ttl(&DataKey::BaseRatePerLedger, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::MultiplierPerLedger) {
        persistent.extend_ttl(&DataKey::MultiplierPerLedger, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::JumpMultiplierPerLedger) {
        persistent.extend_ttl(&DataKey::JumpMultiplierPerLedger, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Kink) {
        persistent.extend_ttl(&DataKey::Kink, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use soroban_sdk::testutils::Address as _;

    const YEAR: u128 = LEDGERS_PER_YEAR;

    fn deploy(env: &Env, base: u128, mult: u128, jump: u128, kink: u128) -> JumpRateModelClient<'_> {
        let admin = Address::generate(env);
        let id = env.register(JumpRateModel, ());
        let client = JumpRateModelClient::new(env, &id);
        client.initialize(&base, &mult, &jump, &kink, &admin);
        client
    }

    #[test]
    fn kinked_rates_match_closed_form() {
        let env = Env::default();
        env.mock_all_auths();
        // 2% base, 18% slope, 400% jump slope, kink at 80%.
        let base_y = SCALE_1E18 / 50;
        let mult_y = SCALE_1E18 * 18 / 100;
        let jump_y = SCALE_1E18 * 4;
        let kink = SCALE_1E18 * 8 / 10;
        let client = deploy(&env, base_y, mult_y, jump_y, kink);

        let base = base_y / YEAR;
        let mult = mult_y / YEAR;
        let jump = jump_y / YEAR;

        // util = 0.5: cash 500, borrows 500
        let util_half = SCALE_1E18 / 2;
        let expected_half = base + mul_div_floor(util_half, mult, SCALE_1E18).unwrap();
        assert_eq!(client.get_borrow_rate(&500, &500, &0), expected_half);

        // util = 0.9: cash 100, borrows 900
        let util_high = SCALE_1E18 * 9 / 10;
        let expected_high = base
            + mul_div_floor(kink, mult, SCALE_1E18).unwrap()
            + mul_div_floor(util_high - kink, jump, SCALE_1E18).unwrap();
        assert_eq!(client.get_borrow_rate(&100, &900, &0), expected_high);
    }

    #[test]
    fn continuous_at_kink() {
        let env = Env::default();
        env.mock_all_auths();
        let client = deploy(
            &env,
            SCALE_1E18 / 50,
            SCALE_1E18 * 18 / 100,
            SCALE_1E18 * 4,
            SCALE_1E18 * 8 / 10,
        );
        let at_kink = client.get_borrow_rate(&200, &800, &0);
        let above = client.get_borrow_rate(&199, &801, &0);
        assert!(above >= at_kink);
        assert!(above - at_kink < SCALE_1E18 / 1_000_000);
    }

    #[test]
    fn utilization_edges() {
        assert_eq!(JumpRateModel::utilization(1_000, 0, 0), 0);
        assert_eq!(JumpRateModel::utilization(0, 0, 0), 0);
        assert_eq!(JumpRateModel::utilization(0, 100, 100), 0);
        assert_eq!(JumpRateModel::utilization(100, 100, 0), SCALE_1E18 / 2);
    }

    #[test]
    fn supply_rate_nets_reserve_factor() {
        let env = Env::default();
        env.mock_all_auths();
        let client = deploy(
            &env,
            0,
            SCALE_1E18 * 20 / 100,
            SCALE_1E18,
            SCALE_1E18 * 8 / 10,
        );
        let rf = SCALE_1E18 / 10;
        let borrow_rate = client.get_borrow_rate(&500, &500, &0);
        let util = SCALE_1E18 / 2;
        let expected = mul_div_floor(
            util,
            mul_div_floor(borrow_rate, SCALE_1E18 - rf, SCALE_1E18).unwrap(),
            SCALE_1E18,
        )
        .unwrap();
        assert_eq!(client.get_supply_rate(&500, &500, &0, &rf), expected);
    }

    #[test]
    #[should_panic(expected = "invalid kink")]
    fn rejects_kink_above_one() {
        let env = Env::default();
        env.mock_all_auths();
        deploy(&env, 0, 0, 0, SCALE_1E18 + 1);
    }

    #[test]
    #[should_panic(expected = "invalid rate params")]
    fn rejects_rate_above_ceiling() {
        let env = Env::default();
        env.mock_all_auths();
        // a 100000x jump slope blows through the per-ledger ceiling at
        // full utilization
        deploy(&env, 0, SCALE_1E18, SCALE_1E18 * 100_000, SCALE_1E18 / 2);
    }

    #[test]
    #[should_panic(expected = "already initialized")]
    fn rejects_double_initialize() {
        let env = Env::default();
        env.mock_all_auths();
        let admin = Address::generate(&env);
        let id = env.register(JumpRateModel, ());
        let client = JumpRateModelClient::new(&env, &id);
        client.initialize(&0, &0, &0, &0, &admin);
        client.initialize(&0, &0, &0, &0, &admin);
    }
}
