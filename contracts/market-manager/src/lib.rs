#![no_std]
use market_math::{mul_div_floor, SCALE_1E18};
use soroban_sdk::{
    contract, contractevent, contractimpl, contracttype, Address, BytesN, Env, IntoVal, Symbol,
    Val, Vec,
};

mod oracle;
use oracle::{price_of, PriceQuote};

#[cfg(test)]
mod test;

const TTL_THRESHOLD: u32 = 100_000_000;
const TTL_EXTEND_TO: u32 = 200_000_000;

/// Collateral weights above this are rejected outright.
const MAX_LIQUIDATION_THRESHOLD: u128 = 900_000_000_000_000_000u128; // 0.9e18

#[contracttype]
pub enum DataKey {
    Admin,                // Address
    PauseGuardian,        // Address (optional)
    OracleRouter,         // Address
    Markets,              // Vec<Address>
    MarketConfig(Address),
    UserMarkets(Address), // Vec<Address> markets the account participates in
    CloseFactor,          // u128 scaled 1e18
    LiquidationIncentive, // u128 scaled 1e18, >= 1e18
    StrictOraclePolicy,   // bool: abort instead of degrading on feed errors
    MintPaused(Address),
    BorrowPaused(Address),
    RedeemPaused(Address),
    LiquidatePaused,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketConfig {
    pub listed: bool,
    pub underlying: Address,
    pub collateral_factor: u128,      // 1e18, weights borrowing power
    pub liquidation_threshold: u128,  // 1e18, weights liquidation eligibility
}

/// A market's own view of one account, passed in with every gating call.
/// The host forbids re-entering the market that is mid-operation, so the
/// manager must not call back into it; it uses these numbers instead.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketSnapshot {
    pub shares: u128,
    pub borrow_balance: u128,
    pub exchange_rate: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketListed {
    #[topic]
    pub market: Address,
    pub underlying: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewCollateralFactors {
    #[topic]
    pub market: Address,
    pub collateral_factor: u128,
    pub liquidation_threshold: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketEntered {
    #[topic]
    pub account: Address,
    pub market: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketExited {
    #[topic]
    pub account: Address,
    pub market: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LiquidateBorrow {
    #[topic]
    pub liquidator: Address,
    #[topic]
    pub borrower: Address,
    pub repay_market: Address,
    pub collateral_market: Address,
    pub repay_amount: u128,
    pub seize_tokens: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionPaused {
    #[topic]
    pub market: Address,
    pub action: Symbol,
    pub paused: bool,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LiquidatePauseSet {
    pub paused: bool,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewCloseFactor {
    pub close_factor: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewLiquidationIncentive {
    pub liquidation_incentive: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewOracleRouter {
    #[topic]
    pub oracle_router: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewPauseGuardian {
    #[topic]
    pub pause_guardian: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewAdmin {
    #[topic]
    pub admin: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StrictOraclePolicySet {
    pub strict: bool,
}

#[contract]
pub struct MarketManager;

#[contractimpl]
impl MarketManager {
    pub fn initialize(env: Env, admin: Address, oracle_router: Address) {
        if env
            .storage()
            .persistent()
            .get::<_, Address>(&DataKey::Admin)
            .is_some()
        {
            panic!("already initialized");
        }
        admin.require_auth();
        let storage = env.storage().persistent();
        storage.set(&DataKey::Admin, &admin);
        storage.set(&DataKey::OracleRouter, &oracle_router);
        storage.set(&DataKey::Markets, &Vec::<Address>::new(&env));
        // half the debt per liquidation, 8% bonus
        storage.set(&DataKey::CloseFactor, &(SCALE_1E18 / 2));
        storage.set(
            &DataKey::LiquidationIncentive,
            &(SCALE_1E18 + SCALE_1E18 * 8 / 100),
        );
        storage.set(&DataKey::StrictOraclePolicy, &false);
        bump_ttl(&env);
    }

    // --- listing and membership ----------------------------------------

    /// Admin: admit a market. Starts with zero collateral weight; raising
    /// it is a separate, deliberate step.
    pub fn list_market(env: Env, market: Address) {
        require_admin(&env);
        if env
            .storage()
            .persistent()
            .get::<_, MarketConfig>(&DataKey::MarketConfig(market.clone()))
            .map(|c| c.listed)
            .unwrap_or(false)
        {
            panic!("market already listed");
        }
        let underlying: Address = env.invoke_contract(
            &market,
            &Symbol::new(&env, "get_underlying_token"),
            Vec::<Val>::new(&env),
        );
        let config = MarketConfig {
            listed: true,
            underlying: underlying.clone(),
            collateral_factor: 0,
            liquidation_threshold: 0,
        };
        env.storage()
            .persistent()
            .set(&DataKey::MarketConfig(market.clone()), &config);
        let mut markets: Vec<Address> = env
            .storage()
            .persistent()
            .get(&DataKey::Markets)
            .unwrap_or_else(|| Vec::new(&env));
        markets.push_back(market.clone());
        env.storage().persistent().set(&DataKey::Markets, &markets);
        MarketListed { market, underlying }.publish(&env);
    }

    /// Admin: set the borrow weight and the liquidation weight. The
    /// borrow weight must sit strictly below the liquidation weight so a
    /// max-borrowed account is not instantly liquidatable.
    pub fn update_collateral_token(
        env: Env,
        market: Address,
        collateral_factor: u128,
        liquidation_threshold: u128,
    ) {
        require_admin(&env);
        let mut config = require_listed(&env, &market);
        if liquidation_threshold > MAX_LIQUIDATION_THRESHOLD {
            panic!("invalid liquidation threshold");
        }
        // Both-zero is the explicit risk-off reset a market is listed
        // with; any live threshold must sit strictly above the borrow
        // weight.
        if liquidation_threshold > 0 && collateral_factor >= liquidation_threshold {
            panic!("invalid collateral factor");
        }
        if liquidation_threshold == 0 && collateral_factor > 0 {
            panic!("invalid collateral factor");
        }
        config.collateral_factor = collateral_factor;
        config.liquidation_threshold = liquidation_threshold;
        env.storage()
            .persistent()
            .set(&DataKey::MarketConfig(market.clone()), &config);
        NewCollateralFactors {
            market,
            collateral_factor,
            liquidation_threshold,
        }
        .publish(&env);
    }

    pub fn enter_markets(env: Env, user: Address, markets: Vec<Address>) {
        user.require_auth();
        for market in markets.iter() {
            require_listed(&env, &market);
            if add_membership(&env, &user, &market) {
                MarketEntered {
                    account: user.clone(),
                    market,
                }
                .publish(&env);
            }
        }
    }

    /// Leave a market. Blocked while debt remains there, or when the
    /// departing collateral is load-bearing for debt elsewhere.
    pub fn exit_market(env: Env, user: Address, market: Address) {
        user.require_auth();
        require_listed(&env, &market);
        if !is_member(&env, &user, &market) {
            return;
        }
        let (shares, borrow_balance, exchange_rate): (u128, u128, u128) = env.invoke_contract(
            &market,
            &Symbol::new(&env, "account_snapshot"),
            (user.clone(),).into_val(&env),
        );
        if borrow_balance > 0 {
            panic!("nonzero borrow balance");
        }
        if shares > 0 {
            let hint = MarketSnapshot {
                shares,
                borrow_balance: 0,
                exchange_rate,
            };
            let (collateral, debt) =
                Self::position_totals(&env, &user, false, Some((&market, &hint, shares, 0)));
            if debt > collateral {
                panic!("insufficient collateral");
            }
        }
        remove_membership(&env, &user, &market);
        MarketExited {
            account: user,
            market,
        }
        .publish(&env);
    }

    // --- solvency -------------------------------------------------------

    /// `(liquidity, shortfall)` weighted by collateral factors; exactly
    /// one side is nonzero (both zero for an empty account).
    pub fn account_liquidity(env: Env, account: Address) -> (u128, u128) {
        let (collateral, debt) = Self::position_totals(&env, &account, false, None);
        if collateral >= debt {
            (collateral - debt, 0)
        } else {
            (0, debt - collateral)
        }
    }

    /// Same sum weighted by liquidation thresholds; a nonzero shortfall
    /// here is what makes an account liquidatable.
    pub fn liquidation_status(env: Env, account: Address) -> (u128, u128) {
        let (collateral, debt) = Self::position_totals(&env, &account, true, None);
        if collateral >= debt {
            (collateral - debt, 0)
        } else {
            (0, debt - collateral)
        }
    }

    // --- gating predicates (called by markets) --------------------------

    pub fn mint_allowed(env: Env, market: Address, _minter: Address, _amount: u128) {
        require_listed(&env, &market);
        if read_flag(&env, &DataKey::MintPaused(market)) {
            panic!("mint paused");
        }
    }

    pub fn redeem_allowed(
        env: Env,
        market: Address,
        redeemer: Address,
        share_amount: u128,
        snapshot: MarketSnapshot,
    ) {
        require_listed(&env, &market);
        if read_flag(&env, &DataKey::RedeemPaused(market.clone())) {
            panic!("redeem paused");
        }
        // Shares in a market the account never entered back no debt.
        if !is_member(&env, &redeemer, &market) {
            return;
        }
        let (collateral, debt) = Self::position_totals(
            &env,
            &redeemer,
            false,
            Some((&market, &snapshot, share_amount, 0)),
        );
        if debt > collateral {
            panic!("redeem not allowed");
        }
    }

    /// Borrowing implies collateral participation, so the borrower is
    /// entered into the market automatically.
    pub fn borrow_allowed(
        env: Env,
        market: Address,
        borrower: Address,
        amount: u128,
        snapshot: MarketSnapshot,
    ) {
        require_listed(&env, &market);
        if read_flag(&env, &DataKey::BorrowPaused(market.clone())) {
            panic!("borrow paused");
        }
        if add_membership(&env, &borrower, &market) {
            MarketEntered {
                account: borrower.clone(),
                market: market.clone(),
            }
            .publish(&env);
        }
        let (collateral, debt) = Self::position_totals(
            &env,
            &borrower,
            false,
            Some((&market, &snapshot, 0, amount)),
        );
        if debt > collateral {
            panic!("borrow not allowed");
        }
    }

    pub fn repay_allowed(env: Env, market: Address, _payer: Address, _borrower: Address) {
        require_listed(&env, &market);
    }

    // --- liquidation ----------------------------------------------------

    /// Repay part of an underwater account's debt and seize collateral
    /// shares at a bonus. The repay leg and the seize leg both live in
    /// the markets; this entrypoint decides whether and how much.
    pub fn liquidate(
        env: Env,
        liquidator: Address,
        borrower: Address,
        repay_market: Address,
        collateral_market: Address,
        repay_amount: u128,
    ) {
        liquidator.require_auth();
        if liquidator == borrower {
            panic!("self liquidation not allowed");
        }
        if repay_market == collateral_market {
            panic!("markets must differ");
        }
        let debt_config = require_listed(&env, &repay_market);
        let coll_config = require_listed(&env, &collateral_market);
        if read_flag(&env, &DataKey::LiquidatePaused) {
            panic!("liquidation paused");
        }
        if repay_amount == 0 {
            panic!("zero amount");
        }
        // Settle interest on both legs before measuring anything.
        let _: Val = env.invoke_contract(
            &repay_market,
            &Symbol::new(&env, "accrue_interest"),
            Vec::<Val>::new(&env),
        );
        let _: Val = env.invoke_contract(
            &collateral_market,
            &Symbol::new(&env, "accrue_interest"),
            Vec::<Val>::new(&env),
        );
        let (_, shortfall) = Self::liquidation_status(env.clone(), borrower.clone());
        if shortfall == 0 {
            panic!("liquidate not allowed");
        }
        let owed: u128 = env.invoke_contract(
            &repay_market,
            &Symbol::new(&env, "borrow_balance"),
            (borrower.clone(),).into_val(&env),
        );
        let close_factor = read_u128(&env, &DataKey::CloseFactor);
        let max_close = mul_div_floor(owed, close_factor, SCALE_1E18)
            .unwrap_or_else(|| panic!("liquidity overflow"));
        if repay_amount > max_close {
            panic!("too much repay");
        }

        let router = get_router(&env);
        let debt_quote = price_of(&env, &router, &debt_config.underlying);
        let coll_quote = price_of(&env, &router, &coll_config.underlying);
        if debt_quote.had_error
            || debt_quote.price == 0
            || coll_quote.had_error
            || coll_quote.price == 0
        {
            panic!("price unavailable");
        }
        let incentive = read_u128(&env, &DataKey::LiquidationIncentive);
        let rate_coll: u128 = env.invoke_contract(
            &collateral_market,
            &Symbol::new(&env, "exchange_rate"),
            Vec::<Val>::new(&env),
        );
        let overflow = || -> ! { panic!("liquidity overflow") };
        let Some(repay_value) = mul_div_floor(repay_amount, debt_quote.price, SCALE_1E18) else {
            overflow();
        };
        let Some(seize_value) = mul_div_floor(repay_value, incentive, SCALE_1E18) else {
            overflow();
        };
        let Some(seize_underlying) = mul_div_floor(seize_value, SCALE_1E18, coll_quote.price)
        else {
            overflow();
        };
        let Some(seize_tokens) = mul_div_floor(seize_underlying, SCALE_1E18, rate_coll) else {
            overflow();
        };
        if seize_tokens == 0 {
            panic!("zero seize");
        }
        let (borrower_shares, _, _): (u128, u128, u128) = env.invoke_contract(
            &collateral_market,
            &Symbol::new(&env, "account_snapshot"),
            (borrower.clone(),).into_val(&env),
        );
        if seize_tokens > borrower_shares {
            panic!("too much seize");
        }

        let _: u128 = env.invoke_contract(
            &repay_market,
            &Symbol::new(&env, "repay_on_behalf"),
            (liquidator.clone(), borrower.clone(), repay_amount).into_val(&env),
        );
        let _: Val = env.invoke_contract(
            &collateral_market,
            &Symbol::new(&env, "seize"),
            (borrower.clone(), liquidator.clone(), seize_tokens).into_val(&env),
        );
        LiquidateBorrow {
            liquidator,
            borrower,
            repay_market,
            collateral_market,
            repay_amount,
            seize_tokens,
        }
        .publish(&env);
    }

    // --- pause controls -------------------------------------------------

    /// The guardian may pause; only the admin may unpause.
    pub fn set_mint_paused(env: Env, caller: Address, market: Address, paused: bool) {
        require_pause_auth(&env, &caller, paused);
        env.storage()
            .persistent()
            .set(&DataKey::MintPaused(market.clone()), &paused);
        ActionPaused {
            market,
            action: Symbol::new(&env, "mint"),
            paused,
        }
        .publish(&env);
    }

    pub fn set_borrow_paused(env: Env, caller: Address, market: Address, paused: bool) {
        require_pause_auth(&env, &caller, paused);
        env.storage()
            .persistent()
            .set(&DataKey::BorrowPaused(market.clone()), &paused);
        ActionPaused {
            market,
            action: Symbol::new(&env, "borrow"),
            paused,
        }
        .publish(&env);
    }

    pub fn set_redeem_paused(env: Env, caller: Address, market: Address, paused: bool) {
        require_pause_auth(&env, &caller, paused);
        env.storage()
            .persistent()
            .set(&DataKey::RedeemPaused(market.clone()), &paused);
        ActionPaused {
            market,
            action: Symbol::new(&env, "redeem"),
            paused,
        }
        .publish(&env);
    }

    pub fn set_liquidate_paused(env: Env, caller: Address, paused: bool) {
        require_pause_auth(&env, &caller, paused);
        env.storage()
            .persistent()
            .set(&DataKey::LiquidatePaused, &paused);
        LiquidatePauseSet { paused }.publish(&env);
    }

    // --- admin ----------------------------------------------------------

    pub fn set_close_factor(env: Env, close_factor: u128) {
        require_admin(&env);
        if close_factor == 0 || close_factor > SCALE_1E18 {
            panic!("invalid close factor");
        }
        env.storage()
            .persistent()
            .set(&DataKey::CloseFactor, &close_factor);
        NewCloseFactor { close_factor }.publish(&env);
    }

    pub fn set_liquidation_incentive(env: Env, liquidation_incentive: u128) {
        require_admin(&env);
        if liquidation_incentive < SCALE_1E18 {
            panic!("invalid liquidation incentive");
        }
        env.storage()
            .persistent()
            .set(&DataKey::LiquidationIncentive, &liquidation_incentive);
        NewLiquidationIncentive {
            liquidation_incentive,
        }
        .publish(&env);
    }

    pub fn set_oracle_router(env: Env, oracle_router: Address) {
        require_admin(&env);
        env.storage()
            .persistent()
            .set(&DataKey::OracleRouter, &oracle_router);
        NewOracleRouter { oracle_router }.publish(&env);
    }

    pub fn set_pause_guardian(env: Env, pause_guardian: Address) {
        require_admin(&env);
        env.storage()
            .persistent()
            .set(&DataKey::PauseGuardian, &pause_guardian);
        NewPauseGuardian { pause_guardian }.publish(&env);
    }

    /// Strict mode turns any flagged price into a hard failure for every
    /// operation that touches the account's portfolio.
    pub fn set_strict_oracle_policy(env: Env, strict: bool) {
        require_admin(&env);
        env.storage()
            .persistent()
            .set(&DataKey::StrictOraclePolicy, &strict);
        StrictOraclePolicySet { strict }.publish(&env);
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

    // --- views ----------------------------------------------------------

    pub fn markets(env: Env) -> Vec<Address> {
        env.storage()
            .persistent()
            .get(&DataKey::Markets)
            .unwrap_or_else(|| Vec::new(&env))
    }

    pub fn market_config(env: Env, market: Address) -> Option<MarketConfig> {
        env.storage()
            .persistent()
            .get(&DataKey::MarketConfig(market))
    }

    pub fn user_markets(env: Env, user: Address) -> Vec<Address> {
        memberships(&env, &user)
    }

    pub fn close_factor(env: Env) -> u128 {
        read_u128(&env, &DataKey::CloseFactor)
    }

    pub fn liquidation_incentive(env: Env) -> u128 {
        read_u128(&env, &DataKey::LiquidationIncentive)
    }

    pub fn oracle_router(env: Env) -> Address {
        get_router(&env)
    }

    pub fn strict_oracle_policy(env: Env) -> bool {
        read_flag(&env, &DataKey::StrictOraclePolicy)
    }

    pub fn get_admin(env: Env) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::Admin)
            .unwrap_or_else(|| panic!("admin not set"))
    }

    // --- internals ------------------------------------------------------

    /// Portfolio sums in oracle terms (1e18). `exclude` carries the
    /// calling market together with its snapshot of the account plus the
    /// hypothetical deltas (shares leaving, debt being added); that
    /// market is valued from the snapshot instead of being re-entered.
    ///
    /// Oracle policy: a flagged collateral price zeroes that collateral's
    /// contribution; a flagged debt price still values the debt at the
    /// salvaged quote, or aborts when there is none. Strict mode aborts
    /// on any flag.
    fn position_totals(
        env: &Env,
        account: &Address,
        by_threshold: bool,
        exclude: Option<(&Address, &MarketSnapshot, u128, u128)>,
    ) -> (u128, u128) {
        let strict = read_flag(env, &DataKey::StrictOraclePolicy);
        let router = get_router(env);
        let mut collateral_usd: u128 = 0;
        let mut debt_usd: u128 = 0;
        for market in memberships(env, account).iter() {
            let Some(config) = env
                .storage()
                .persistent()
                .get::<_, MarketConfig>(&DataKey::MarketConfig(market.clone()))
            else {
                continue;
            };
            let (shares, borrow_balance, exchange_rate, redeem_shares, borrow_delta) =
                match exclude {
                    Some((excluded, hint, redeem_shares, borrow_delta)) if *excluded == market => (
                        hint.shares,
                        hint.borrow_balance,
                        hint.exchange_rate,
                        redeem_shares,
                        borrow_delta,
                    ),
                    _ => {
                        let (s, b, r): (u128, u128, u128) = env.invoke_contract(
                            &market,
                            &Symbol::new(env, "account_snapshot"),
                            (account.clone(),).into_val(env),
                        );
                        (s, b, r, 0, 0)
                    }
                };
            let quote: PriceQuote = price_of(env, &router, &config.underlying);
            if strict && quote.had_error {
                panic!("price unavailable");
            }
            let overflow = || -> ! { panic!("liquidity overflow") };

            let counted_shares = shares.saturating_sub(redeem_shares);
            let factor = if by_threshold {
                config.liquidation_threshold
            } else {
                config.collateral_factor
            };
            if counted_shares > 0 && factor > 0 && !quote.had_error {
                let Some(underlying_value) =
                    mul_div_floor(counted_shares, exchange_rate, SCALE_1E18)
                else {
                    overflow();
                };
                let Some(value) = mul_div_floor(underlying_value, quote.price, SCALE_1E18) else {
                    overflow();
                };
                let Some(weighted) = mul_div_floor(value, factor, SCALE_1E18) else {
                    overflow();
                };
                collateral_usd = collateral_usd.saturating_add(weighted);
            }

            let total_debt = borrow_balance.saturating_add(borrow_delta);
            if total_debt > 0 {
                if quote.price == 0 {
                    panic!("price unavailable");
                }
                let Some(value) = mul_div_floor(total_debt, quote.price, SCALE_1E18) else {
                    overflow();
                };
                debt_usd = debt_usd.saturating_add(value);
            }
        }
        (collateral_usd, debt_usd)
    }
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

fn require_pause_auth(env: &Env, caller: &Address, pausing: bool) {
    caller.require_auth();
    let admin: Address = env
        .storage()
        .persistent()
        .get(&DataKey::Admin)
        .unwrap_or_else(|| panic!("admin not set"));
    if *caller == admin {
        return;
    }
    let guardian: Option<Address> = env.storage().persistent().get(&DataKey::PauseGuardian);
    if pausing && guardian.as_ref() == Some(caller) {
        return;
    }
    panic!("not authorized");
}

fn require_listed(env: &Env, market: &Address) -> MarketConfig {
    match env
        .storage()
        .persistent()
        .get::<_, MarketConfig>(&DataKey::MarketConfig(market.clone()))
    {
        Some(config) if config.listed => config,
        _ => panic!("market not listed"),
    }
}

fn get_router(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::OracleRouter)
        .unwrap_or_else(|| panic!("oracle not set"))
}

fn read_u128(env: &Env, key: &DataKey) -> u128 {
    env.storage().persistent().get(key).unwrap_or(0)
}

fn read_flag(env: &Env, key: &DataKey) -> bool {
    env.storage().persistent().get(key).unwrap_or(false)
}

fn memberships(env: &Env, user: &Address) -> Vec<Address> {
    env.storage()
        .persistent()
        .get(&DataKey::UserMarkets(user.clone()))
        .unwrap_or_else(|| Vec::new(env))
}

/// Returns true when the membership was newly added.
fn add_membership(env: &Env, user: &Address, market: &Address) -> bool {
    let mut markets = memberships(env, user);
    if markets.first_index_of(market.clone()).is_some() {
        return false;
    }
    markets.push_back(market.clone());
    env.storage()
        .persistent()
        .set(&DataKey::UserMarkets(user.clone()), &markets);
    true
}

fn remove_membership(env: &Env, user: &Address, market: &Address) {
    let mut markets = memberships(env, user);
    if let Some(index) = markets.first_index_of(market.clone()) {
        let _ = markets.remove(index);
        env.storage()
            .persistent()
            .set(&DataKey::UserMarkets(user.clone()), &markets);
    }
}

fn is_member(env: &Env, user: &Address, market: &Address) -> bool {
    memberships(env, user).first_index_of(market.clone()).is_some()
}

fn bump_ttl(env: &Env) {
    let persistent = env.storage().persistent();
    if persistent.has(&DataKey::Admin) {
        persistent.extend_ttl(&DataKey::Admin, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Markets) {
        persistent.extend_ttl(&DataKey::Markets, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::OracleRouter) {
        persistent.extend_ttl(&DataKey::OracleRouter, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}
