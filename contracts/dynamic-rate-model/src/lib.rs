#![no_std]
use market_math::{mul_div_floor, SCALE_1E18};
use soroban_sdk::{contract, contractevent, contractimpl, contracttype, Address, BytesN, Env};

/// Assumes 5-second ledger close times.
pub const LEDGERS_PER_YEAR: u128 = 6_307_200u128;
/// Hard per-ledger borrow rate ceiling (1e18 scale), shared with the
/// static jump model.
pub const MAX_BORROW_RATE: u128 = 5_000_000_000_000u128;

const TTL_THRESHOLD: u32 = 100_000_000;
const TTL_EXTEND_TO: u32 = 200_000_000;

#[contracttype]
pub enum DataKey {
    BaseRatePerLedger,       // u128 scaled 1e18
    BaseMultiplierPerLedger, // u128 scaled 1e18, floor the multiplier decays to
    MultiplierPerLedger,     // u128 scaled 1e18, current (adjusted) slope
    MaxMultiplierPerLedger,  // u128 scaled 1e18, adjustment ceiling
    JumpMultiplierPerLedger, // u128 scaled 1e18
    Kink,                    // u128 scaled 1e18
    TargetUtil,              // u128 scaled 1e18
    AdjustmentVelocity,      // u128 scaled 1e18, per-ledger growth coefficient
    DecayRate,               // u128 scaled 1e18, strictly below 1e18
    LastAdjustLedger,        // u32
    Admin,                   // Address
}

#[contract]
pub struct DynamicRateModel;

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MultiplierAdjusted {
    pub old_multiplier: u128,
    pub new_multiplier: u128,
    pub utilization: u128,
}

/// Kinked model whose below-kink slope drifts toward demand: sustained
/// utilization above target ratchets the multiplier up, slack demand
/// decays it back toward the configured floor. The multiplier moves at
/// most once per ledger, on the first rate query of that ledger, so a
/// market accruing interest sees one adjustment per accrual.
#[contractimpl]
impl DynamicRateModel {
    pub fn initialize(
        env: Env,
        base_rate_per_year: u128,
        multiplier_per_year: u128,
        max_multiplier_per_year: u128,
        jump_multiplier_per_year: u128,
        kink: u128,
        target_util: u128,
        adjustment_velocity: u128,
        decay_rate: u128,
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
        if kink > SCALE_1E18 || target_util > SCALE_1E18 {
            panic!("invalid kink");
        }
        if decay_rate >= SCALE_1E18 {
            panic!("invalid decay rate");
        }
        admin.require_auth();
        let base = base_rate_per_year / LEDGERS_PER_YEAR;
        let mult = multiplier_per_year / LEDGERS_PER_YEAR;
        let max_mult = max_multiplier_per_year / LEDGERS_PER_YEAR;
        let jump = jump_multiplier_per_year / LEDGERS_PER_YEAR;
        if max_mult < mult {
            panic!("invalid rate params");
        }
        // Prove the ceiling holds at the most aggressive multiplier the
        // adjustment loop can ever reach.
        if rate_at(base, max_mult, jump, kink, SCALE_1E18) > MAX_BORROW_RATE {
            panic!("invalid rate params");
        }
        let storage = env.storage().persistent();
        storage.set(&DataKey::Admin, &admin);
        storage.set(&DataKey::BaseRatePerLedger, &base);
        storage.set(&DataKey::BaseMultiplierPerLedger, &mult);
        storage.set(&DataKey::MultiplierPerLedger, &mult);
        storage.set(&DataKey::MaxMultiplierPerLedger, &max_mult);
        storage.set(&DataKey::JumpMultiplierPerLedger, &jump);
        storage.set(&DataKey::Kink, &kink);
        storage.set(&DataKey::TargetUtil, &target_util);
        storage.set(&DataKey::AdjustmentVelocity, &adjustment_velocity);
        storage.set(&DataKey::DecayRate, &decay_rate);
        storage.set(&DataKey::LastAdjustLedger, &env.ledger().sequence());
        bump_ttl(&env);
    }

    /// Per-ledger borrow rate (1e18). The first call in a ledger also
    /// moves the multiplier; repeat calls in the same ledger are pure.
    pub fn get_borrow_rate(env: Env, cash: u128, borrows: u128, reserves: u128) -> u128 {
        ensure_initialized(&env);
        bump_ttl(&env);
        let util = Self::utilization(cash, borrows, reserves);
        Self::adjust_multiplier(&env, util);
        let base: u128 = read(&env, &DataKey::BaseRatePerLedger);
        let mult: u128 = read(&env, &DataKey::MultiplierPerLedger);
        let jump: u128 = read(&env, &DataKey::JumpMultiplierPerLedger);
        let kink: u128 = read(&env, &DataKey::Kink);
        rate_at(base, mult, jump, kink, util)
    }

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

    pub fn multiplier_per_ledger(env: Env) -> u128 {
        read(&env, &DataKey::MultiplierPerLedger)
    }

    pub fn kink(env: Env) -> u128 {
        read(&env, &DataKey::Kink)
    }

    pub fn target_util(env: Env) -> u128 {
        read(&env, &DataKey::TargetUtil)
    }

    pub fn upgrade_wasm(env: Env, admin: Address, new_wasm_hash: BytesN<32>) {
        require_admin(&env, &admin);
        env.deployer().update_current_contract_wasm(new_wasm_hash);
    }

    fn adjust_multiplier(env: &Env, util: u128) {
        let seq = env.ledger().sequence();
        let last: u32 = read32(env, &DataKey::LastAdjustLedger);
        if seq <= last {
            return;
        }
        env.storage()
            .persistent()
            .set(&DataKey::LastAdjustLedger, &seq);

        let old: u128 = read(env, &DataKey::MultiplierPerLedger);
        let target: u128 = read(env, &DataKey::TargetUtil);
        let new = if util > target {
            let velocity: u128 = read(env, &DataKey::AdjustmentVelocity);
            let max_mult: u128 = read(env, &DataKey::MaxMultiplierPerLedger);
            let pressure = mul_div_floor(velocity, util - target, SCALE_1E18).unwrap_or(0);
            let grown = mul_div_floor(old, SCALE_1E18.saturating_add(pressure), SCALE_1E18)
                .unwrap_or(max_mult);
            grown.min(max_mult)
        } else {
            let decay: u128 = read(env, &DataKey::DecayRate);
            let floor: u128 = read(env, &DataKey::BaseMultiplierPerLedger);
            let decayed = mul_div_floor(old, decay, SCALE_1E18).unwrap_or(floor);
            decayed.max(floor)
        };
        if new != old {
            env.storage()
                .persistent()
                .set(&DataKey::MultiplierPerLedger, &new);
            MultiplierAdjusted {
                old_multiplier: old,
                new_multiplier: new,
                utilization: util,
            }
            .publish(env);
        }
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

fn read32(env: &Env, key: &DataKey) -> u32 {
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
    if persistent.has(&DataKey::MultiplierPerLedger) {
        persistent.extend_ttl(&DataKey::MultiplierPerLedger, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::LastAdjustLedger) {
        persistent.extend_ttl(&DataKey::LastAdjustLedger, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}
