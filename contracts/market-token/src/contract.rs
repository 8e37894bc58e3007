use market_math::{checked_add, mul_div_ceil, mul_div_floor, SCALE_1E18};
use soroban_sdk::{
    auth::{ContractContext, InvokerContractAuthEntry, SubContractInvocation},
    contract, contractimpl, token, Address, BytesN, Env, IntoVal, String, Symbol, Val, Vec,
};
use stellar_tokens::fungible::burnable::emit_burn;
use stellar_tokens::fungible::Base as TokenBase;

use crate::constants::*;
use crate::events::*;
use crate::helpers::*;
use crate::storage::*;

#[contract]
pub struct MarketToken;

#[contractimpl]
impl MarketToken {
    /// One market per underlying asset. Shares are a fungible token; all
    /// factor parameters are 1e18 scaled. The interest model is probed
    /// before it is accepted.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        env: Env,
        underlying: Address,
        manager: Address,
        interest_model: Address,
        admin: Address,
        name: String,
        symbol: String,
        initial_exchange_rate: u128,
        reserve_factor: u128,
        protocol_seize_share: u128,
    ) {
        if env
            .storage()
            .persistent()
            .get::<_, bool>(&DataKey::Initialized)
            .unwrap_or(false)
        {
            panic!("already initialized");
        }
        if initial_exchange_rate == 0 {
            panic!("invalid exchange rate");
        }
        if reserve_factor > SCALE_1E18 {
            panic!("invalid reserve factor");
        }
        if protocol_seize_share > SCALE_1E18 {
            panic!("invalid seize share");
        }
        admin.require_auth();
        let _: u128 = call_contract_or_panic(
            &env,
            &interest_model,
            "get_borrow_rate",
            (0u128, 0u128, 0u128),
        );
        let storage = env.storage().persistent();
        storage.set(&DataKey::Initialized, &true);
        storage.set(&DataKey::UnderlyingToken, &underlying);
        storage.set(&DataKey::Manager, &manager);
        storage.set(&DataKey::InterestModel, &interest_model);
        storage.set(&DataKey::Admin, &admin);
        storage.set(&DataKey::InitialExchangeRate, &initial_exchange_rate);
        storage.set(&DataKey::ReserveFactor, &reserve_factor);
        storage.set(&DataKey::ProtocolSeizeShare, &protocol_seize_share);
        storage.set(&DataKey::TotalBorrows, &0u128);
        storage.set(&DataKey::TotalReserves, &0u128);
        storage.set(&DataKey::BorrowIndex, &SCALE_1E18);
        storage.set(&DataKey::AccrualLedger, &env.ledger().sequence());
        TokenBase::set_metadata(&env, SHARE_DECIMALS, name, symbol);
        bump_core_ttl(&env);
    }

    /// Roll interest forward to the current ledger. Idempotent within a
    /// ledger; every state-changing operation calls this first.
    pub fn accrue_interest(env: Env) {
        ensure_initialized(&env);
        let seq = env.ledger().sequence();
        let last: u32 = env
            .storage()
            .persistent()
            .get(&DataKey::AccrualLedger)
            .unwrap_or(seq);
        if seq <= last {
            return;
        }
        let elapsed = (seq - last) as u128;

        let cash = Self::get_cash(env.clone());
        let borrows = read_u128(&env, &DataKey::TotalBorrows);
        let reserves = read_u128(&env, &DataKey::TotalReserves);
        let reserve_factor = read_u128(&env, &DataKey::ReserveFactor);
        let model: Address = env
            .storage()
            .persistent()
            .get(&DataKey::InterestModel)
            .unwrap_or_else(|| panic!("model not set"));

        let rate: u128 =
            call_contract_or_panic(&env, &model, "get_borrow_rate", (cash, borrows, reserves));
        if rate > MAX_BORROW_RATE {
            panic!("interest rate out of bounds");
        }
        let overflow = || -> ! {
            InterestOverflow {
                total_borrows: borrows,
                rate_per_ledger: rate,
                elapsed,
            }
            .publish(&env);
            panic!("interest overflow");
        };
        let Some(factor) = rate.checked_mul(elapsed) else {
            overflow();
        };
        let Some(interest) = mul_div_floor(borrows, factor, SCALE_1E18) else {
            overflow();
        };
        let Some(new_borrows) = checked_add(borrows, interest) else {
            overflow();
        };
        let Some(reserve_delta) = mul_div_floor(interest, reserve_factor, SCALE_1E18) else {
            overflow();
        };
        let Some(new_reserves) = checked_add(reserves, reserve_delta) else {
            overflow();
        };
        let index = Self::borrow_index(env.clone());
        let Some(index_delta) = mul_div_floor(index, factor, SCALE_1E18) else {
            overflow();
        };
        let Some(new_index) = checked_add(index, index_delta) else {
            overflow();
        };

        let storage = env.storage().persistent();
        storage.set(&DataKey::TotalBorrows, &new_borrows);
        storage.set(&DataKey::TotalReserves, &new_reserves);
        storage.set(&DataKey::BorrowIndex, &new_index);
        storage.set(&DataKey::AccrualLedger, &seq);
        bump_market_ttl(&env);
        AccrueInterest {
            interest_accumulated: interest,
            borrow_index: new_index,
            total_borrows: new_borrows,
        }
        .publish(&env);
    }

    /// Underlying immediately or recallably available: the market's own
    /// token balance plus whatever sits in the yield vault.
    pub fn get_cash(env: Env) -> u128 {
        let underlying = ensure_initialized(&env);
        let local = token_balance(&env, &underlying, &env.current_contract_address());
        let vault_assets = match env
            .storage()
            .persistent()
            .get::<_, Address>(&DataKey::YieldVault)
        {
            Some(vault) => {
                call_contract_or_panic(&env, &vault, "total_assets", Vec::<Val>::new(&env))
            }
            None => 0u128,
        };
        local.saturating_add(vault_assets)
    }

    /// Underlying per share, 1e18. `(cash + borrows - reserves) / supply`;
    /// the configured initial rate while no shares exist.
    pub fn exchange_rate(env: Env) -> u128 {
        let supply = total_shares(&env);
        if supply == 0 {
            return read_u128(&env, &DataKey::InitialExchangeRate);
        }
        let cash = Self::get_cash(env.clone());
        let borrows = read_u128(&env, &DataKey::TotalBorrows);
        let reserves = read_u128(&env, &DataKey::TotalReserves);
        let backing = cash.saturating_add(borrows).saturating_sub(reserves);
        mul_div_floor(backing, SCALE_1E18, supply)
            .unwrap_or_else(|| panic!("exchange rate overflow"))
    }

    /// Debt owed right now: stored principal scaled by the index drift
    /// since the snapshot.
    pub fn borrow_balance(env: Env, user: Address) -> u128 {
        let snap: Option<BorrowSnapshot> = env
            .storage()
            .persistent()
            .get(&DataKey::BorrowSnapshots(user.clone()));
        bump_borrow_snapshot_ttl(&env, &user);
        let Some(snapshot) = snap else {
            return 0;
        };
        if snapshot.principal == 0 {
            return 0;
        }
        let index = Self::borrow_index(env);
        mul_div_floor(snapshot.principal, index, snapshot.interest_index)
            .unwrap_or_else(|| panic!("borrow balance overflow"))
    }

    pub fn borrow_index(env: Env) -> u128 {
        let index = read_u128(&env, &DataKey::BorrowIndex);
        if index == 0 {
            SCALE_1E18
        } else {
            index
        }
    }

    /// `(shares, borrow_balance, exchange_rate)` — the one call the
    /// manager makes per market when summing a portfolio.
    pub fn account_snapshot(env: Env, user: Address) -> (u128, u128, u128) {
        (
            share_balance(&env, &user),
            Self::borrow_balance(env.clone(), user),
            Self::exchange_rate(env),
        )
    }

    /// Deposit underlying, receive shares at the current exchange rate
    /// (rounded down).
    pub fn mint(env: Env, user: Address, amount: u128) {
        Self::accrue_interest(env.clone());
        user.require_auth();
        if amount == 0 {
            panic!("zero amount");
        }
        let underlying = ensure_initialized(&env);
        let supply_cap = read_u128(&env, &DataKey::SupplyCap);
        if supply_cap > 0 {
            let rate = Self::exchange_rate(env.clone());
            let supplied = mul_div_floor(total_shares(&env), rate, SCALE_1E18).unwrap_or(u128::MAX);
            if supplied.saturating_add(amount) > supply_cap {
                panic!("supply cap exceeded");
            }
        }
        let manager = get_manager(&env);
        let _: Val = env.invoke_contract(
            &manager,
            &Symbol::new(&env, "mint_allowed"),
            (env.current_contract_address(), user.clone(), amount).into_val(&env),
        );
        let rate = Self::exchange_rate(env.clone());
        let shares =
            mul_div_floor(amount, SCALE_1E18, rate).unwrap_or_else(|| panic!("mint overflow"));
        if shares == 0 {
            panic!("zero shares");
        }
        token::Client::new(&env, &underlying).transfer(
            &user,
            &env.current_contract_address(),
            &to_i128(amount),
        );
        TokenBase::mint(&env, &user, to_i128(shares));
        Mint {
            minter: user,
            mint_amount: amount,
            mint_tokens: shares,
        }
        .publish(&env);
    }

    /// Burn an exact number of shares; payout rounds down.
    pub fn redeem(env: Env, user: Address, share_amount: u128) {
        Self::accrue_interest(env.clone());
        user.require_auth();
        if share_amount == 0 {
            panic!("zero amount");
        }
        let rate = Self::exchange_rate(env.clone());
        let amount = mul_div_floor(share_amount, rate, SCALE_1E18)
            .unwrap_or_else(|| panic!("redeem overflow"));
        Self::redeem_internal(&env, &user, share_amount, amount);
    }

    /// Withdraw an exact underlying amount; the share burn rounds up so
    /// the payout is always fully backed.
    pub fn redeem_underlying(env: Env, user: Address, amount: u128) {
        Self::accrue_interest(env.clone());
        user.require_auth();
        if amount == 0 {
            panic!("zero amount");
        }
        let rate = Self::exchange_rate(env.clone());
        let share_amount = mul_div_ceil(amount, SCALE_1E18, rate)
            .unwrap_or_else(|| panic!("redeem overflow"));
        Self::redeem_internal(&env, &user, share_amount, amount);
    }

    /// Borrow against collateral tracked by the manager. The manager gets
    /// this market's own numbers as a snapshot; it cannot call back in.
    pub fn borrow(env: Env, user: Address, amount: u128) {
        Self::accrue_interest(env.clone());
        user.require_auth();
        if amount == 0 {
            panic!("zero amount");
        }
        let underlying = ensure_initialized(&env);
        if amount > Self::get_cash(env.clone()) {
            panic!("not enough cash");
        }
        let borrows = read_u128(&env, &DataKey::TotalBorrows);
        let borrow_cap = read_u128(&env, &DataKey::BorrowCap);
        if borrow_cap > 0 && borrows.saturating_add(amount) > borrow_cap {
            panic!("borrow cap exceeded");
        }
        let manager = get_manager(&env);
        let hint = Self::snapshot_of(&env, &user);
        let _: Val = env.invoke_contract(
            &manager,
            &Symbol::new(&env, "borrow_allowed"),
            (env.current_contract_address(), user.clone(), amount, hint).into_val(&env),
        );
        let owed = Self::borrow_balance(env.clone(), user.clone());
        let new_principal =
            checked_add(owed, amount).unwrap_or_else(|| panic!("borrow overflow"));
        write_borrow_snapshot(&env, &user, new_principal);
        let new_borrows =
            checked_add(borrows, amount).unwrap_or_else(|| panic!("borrow overflow"));
        env.storage()
            .persistent()
            .set(&DataKey::TotalBorrows, &new_borrows);
        ensure_local_cash(&env, &underlying, amount);
        token::Client::new(&env, &underlying).transfer(
            &env.current_contract_address(),
            &user,
            &to_i128(amount),
        );
        BorrowEvent {
            borrower: user,
            borrow_amount: amount,
            account_borrows: new_principal,
            total_borrows: new_borrows,
        }
        .publish(&env);
    }

    /// Repay own debt. `u128::MAX` repays everything owed; any other
    /// amount is capped at the debt. Returns the amount actually repaid.
    pub fn repay(env: Env, user: Address, amount: u128) -> u128 {
        Self::accrue_interest(env.clone());
        user.require_auth();
        let manager = get_manager(&env);
        let _: Val = env.invoke_contract(
            &manager,
            &Symbol::new(&env, "repay_allowed"),
            (env.current_contract_address(), user.clone(), user.clone()).into_val(&env),
        );
        Self::repay_internal(&env, &user, &user, amount)
    }

    /// Manager-only: pull a repayment from `payer` against `borrower`'s
    /// debt. This is the repay leg of a liquidation; the manager has
    /// already vetted the market and is mid-call, so it must not be
    /// invoked back here.
    pub fn repay_on_behalf(env: Env, payer: Address, borrower: Address, amount: u128) -> u128 {
        get_manager(&env).require_auth();
        Self::accrue_interest(env.clone());
        Self::repay_internal(&env, &payer, &borrower, amount)
    }

    /// Manager-only: move seized collateral shares from the borrower to
    /// the liquidator. The protocol slice is burned and its underlying
    /// value booked into reserves, so remaining suppliers keep it.
    pub fn seize(env: Env, borrower: Address, liquidator: Address, share_amount: u128) {
        get_manager(&env).require_auth();
        Self::accrue_interest(env.clone());
        if share_amount == 0 {
            panic!("zero amount");
        }
        if borrower == liquidator {
            panic!("self liquidation not allowed");
        }
        let balance = share_balance(&env, &borrower);
        if share_amount > balance {
            panic!("too much seize");
        }
        let protocol_share = read_u128(&env, &DataKey::ProtocolSeizeShare);
        let protocol_tokens = mul_div_floor(share_amount, protocol_share, SCALE_1E18).unwrap_or(0);
        let liquidator_tokens = share_amount - protocol_tokens;
        if protocol_tokens > 0 {
            let rate = Self::exchange_rate(env.clone());
            let reserve_delta = mul_div_floor(protocol_tokens, rate, SCALE_1E18).unwrap_or(0);
            let reserves = read_u128(&env, &DataKey::TotalReserves);
            env.storage().persistent().set(
                &DataKey::TotalReserves,
                &reserves.saturating_add(reserve_delta),
            );
            TokenBase::update(&env, Some(&borrower), None, to_i128(protocol_tokens));
            emit_burn(&env, &borrower, to_i128(protocol_tokens));
        }
        if liquidator_tokens > 0 {
            TokenBase::update(
                &env,
                Some(&borrower),
                Some(&liquidator),
                to_i128(liquidator_tokens),
            );
            stellar_tokens::fungible::emit_transfer(
                &env,
                &borrower,
                &liquidator,
                to_i128(liquidator_tokens),
            );
        }
        SeizeCollateral {
            borrower,
            liquidator,
            seize_tokens: share_amount,
            protocol_tokens,
        }
        .publish(&env);
    }

    /// Donate underlying straight into reserves.
    pub fn add_reserves(env: Env, from: Address, amount: u128) {
        Self::accrue_interest(env.clone());
        from.require_auth();
        if amount == 0 {
            panic!("zero amount");
        }
        let underlying = ensure_initialized(&env);
        token::Client::new(&env, &underlying).transfer(
            &from,
            &env.current_contract_address(),
            &to_i128(amount),
        );
        let reserves = read_u128(&env, &DataKey::TotalReserves);
        let new_reserves =
            checked_add(reserves, amount).unwrap_or_else(|| panic!("reserve overflow"));
        env.storage()
            .persistent()
            .set(&DataKey::TotalReserves, &new_reserves);
        ReservesAdded {
            benefactor: from,
            add_amount: amount,
            total_reserves: new_reserves,
        }
        .publish(&env);
    }

    /// Admin: withdraw accumulated reserves. Gated by the market's own
    /// token balance; sweep funds back from the vault first if needed.
    pub fn reduce_reserves(env: Env, amount: u128) {
        let admin = get_admin(&env);
        admin.require_auth();
        Self::accrue_interest(env.clone());
        if amount == 0 {
            panic!("zero amount");
        }
        let reserves = read_u128(&env, &DataKey::TotalReserves);
        if amount > reserves {
            panic!("insufficient reserves");
        }
        let underlying = ensure_initialized(&env);
        if amount > token_balance(&env, &underlying, &env.current_contract_address()) {
            panic!("not enough cash");
        }
        let new_reserves = reserves - amount;
        env.storage()
            .persistent()
            .set(&DataKey::TotalReserves, &new_reserves);
        token::Client::new(&env, &underlying).transfer(
            &env.current_contract_address(),
            &admin,
            &to_i128(amount),
        );
        ReservesReduced {
            reduce_amount: amount,
            total_reserves: new_reserves,
        }
        .publish(&env);
    }

    /// Admin: attach an external yield vault. Probed before acceptance.
    pub fn set_yield_vault(env: Env, vault: Address) {
        get_admin(&env).require_auth();
        Self::accrue_interest(env.clone());
        let _: u128 = call_contract_or_panic(&env, &vault, "total_assets", Vec::<Val>::new(&env));
        env.storage().persistent().set(&DataKey::YieldVault, &vault);
        NewYieldVault { vault }.publish(&env);
    }

    /// Admin: move idle cash into the yield vault. Total cash is
    /// unchanged; only where it sits.
    pub fn sweep_to_vault(env: Env, amount: u128) {
        get_admin(&env).require_auth();
        Self::accrue_interest(env.clone());
        if amount == 0 {
            panic!("zero amount");
        }
        let underlying = ensure_initialized(&env);
        let vault: Address = env
            .storage()
            .persistent()
            .get(&DataKey::YieldVault)
            .unwrap_or_else(|| panic!("vault not set"));
        if amount > token_balance(&env, &underlying, &env.current_contract_address()) {
            panic!("not enough cash");
        }
        // The vault pulls our tokens inside its deposit call; authorize
        // that one transfer.
        let transfer_args: Vec<Val> = (
            env.current_contract_address(),
            vault.clone(),
            to_i128(amount),
        )
            .into_val(&env);
        let mut auths = Vec::new(&env);
        auths.push_back(InvokerContractAuthEntry::Contract(SubContractInvocation {
            context: ContractContext {
                contract: underlying.clone(),
                fn_name: Symbol::new(&env, "transfer"),
                args: transfer_args,
            },
            sub_invocations: Vec::new(&env),
        }));
        env.authorize_as_current_contract(auths);
        let _: Val = env.invoke_contract(
            &vault,
            &Symbol::new(&env, "deposit"),
            (env.current_contract_address(), amount).into_val(&env),
        );
    }

    /// Pull realized yield from the vault into cash. Permissionless; all
    /// suppliers benefit through the exchange rate.
    pub fn harvest(env: Env) -> u128 {
        ensure_initialized(&env);
        Self::accrue_interest(env.clone());
        let vault: Address = env
            .storage()
            .persistent()
            .get(&DataKey::YieldVault)
            .unwrap_or_else(|| panic!("vault not set"));
        let harvested: u128 = call_contract_or_panic(
            &env,
            &vault,
            "harvest",
            (env.current_contract_address(),),
        );
        if harvested > 0 {
            YieldHarvested { amount: harvested }.publish(&env);
        }
        harvested
    }

    // --- share token surface -------------------------------------------

    pub fn balance(env: Env, owner: Address) -> i128 {
        TokenBase::balance(&env, &owner)
    }

    pub fn total_supply(env: Env) -> i128 {
        TokenBase::total_supply(&env)
    }

    pub fn decimals(env: Env) -> u32 {
        TokenBase::decimals(&env)
    }

    pub fn name(env: Env) -> String {
        TokenBase::name(&env)
    }

    pub fn symbol(env: Env) -> String {
        TokenBase::symbol(&env)
    }

    /// Share transfers move collateral, so they pass the same manager
    /// check as a redeem of the transferred amount.
    pub fn transfer(env: Env, from: Address, to: Address, amount: i128) {
        Self::accrue_interest(env.clone());
        if amount <= 0 {
            panic!("zero amount");
        }
        Self::check_transfer_allowed(&env, &from, amount as u128);
        TokenBase::transfer(&env, &from, &to, amount);
    }

    pub fn transfer_from(env: Env, spender: Address, from: Address, to: Address, amount: i128) {
        Self::accrue_interest(env.clone());
        if amount <= 0 {
            panic!("zero amount");
        }
        Self::check_transfer_allowed(&env, &from, amount as u128);
        TokenBase::transfer_from(&env, &spender, &from, &to, amount);
    }

    pub fn approve(env: Env, owner: Address, spender: Address, amount: i128, live_until: u32) {
        TokenBase::approve(&env, &owner, &spender, amount, live_until);
    }

    pub fn allowance(env: Env, owner: Address, spender: Address) -> i128 {
        TokenBase::allowance(&env, &owner, &spender)
    }

    // --- admin ----------------------------------------------------------

    pub fn set_reserve_factor(env: Env, reserve_factor: u128) {
        get_admin(&env).require_auth();
        Self::accrue_interest(env.clone());
        if reserve_factor > SCALE_1E18 {
            panic!("invalid reserve factor");
        }
        env.storage()
            .persistent()
            .set(&DataKey::ReserveFactor, &reserve_factor);
        NewReserveFactor { reserve_factor }.publish(&env);
    }

    pub fn set_protocol_seize_share(env: Env, protocol_seize_share: u128) {
        get_admin(&env).require_auth();
        if protocol_seize_share > SCALE_1E18 {
            panic!("invalid seize share");
        }
        env.storage()
            .persistent()
            .set(&DataKey::ProtocolSeizeShare, &protocol_seize_share);
        NewProtocolSeizeShare {
            protocol_seize_share,
        }
        .publish(&env);
    }

    /// Swap the rate model. Interest is settled with the outgoing model
    /// first; the new one is probed before it takes over.
    pub fn set_interest_model(env: Env, model: Address) {
        get_admin(&env).require_auth();
        Self::accrue_interest(env.clone());
        let _: u128 =
            call_contract_or_panic(&env, &model, "get_borrow_rate", (0u128, 0u128, 0u128));
        env.storage()
            .persistent()
            .set(&DataKey::InterestModel, &model);
        NewInterestModel { model }.publish(&env);
    }

    pub fn set_manager(env: Env, manager: Address) {
        get_admin(&env).require_auth();
        let _: u128 =
            call_contract_or_panic(&env, &manager, "close_factor", Vec::<Val>::new(&env));
        env.storage().persistent().set(&DataKey::Manager, &manager);
        NewManager { manager }.publish(&env);
    }

    pub fn set_supply_cap(env: Env, supply_cap: u128) {
        get_admin(&env).require_auth();
        env.storage()
            .persistent()
            .set(&DataKey::SupplyCap, &supply_cap);
        NewSupplyCap { supply_cap }.publish(&env);
    }

    pub fn set_borrow_cap(env: Env, borrow_cap: u128) {
        get_admin(&env).require_auth();
        env.storage()
            .persistent()
            .set(&DataKey::BorrowCap, &borrow_cap);
        NewBorrowCap { borrow_cap }.publish(&env);
    }

    pub fn set_admin(env: Env, new_admin: Address) {
        get_admin(&env).require_auth();
        env.storage().persistent().set(&DataKey::Admin, &new_admin);
        NewAdmin { admin: new_admin }.publish(&env);
    }

    pub fn upgrade_wasm(env: Env, new_wasm_hash: BytesN<32>) {
        get_admin(&env).require_auth();
        env.deployer().update_current_contract_wasm(new_wasm_hash);
    }

    // --- views ----------------------------------------------------------

    pub fn total_borrows(env: Env) -> u128 {
        read_u128(&env, &DataKey::TotalBorrows)
    }

    pub fn total_reserves(env: Env) -> u128 {
        read_u128(&env, &DataKey::TotalReserves)
    }

    pub fn reserve_factor(env: Env) -> u128 {
        read_u128(&env, &DataKey::ReserveFactor)
    }

    pub fn protocol_seize_share(env: Env) -> u128 {
        read_u128(&env, &DataKey::ProtocolSeizeShare)
    }

    pub fn supply_cap(env: Env) -> u128 {
        read_u128(&env, &DataKey::SupplyCap)
    }

    pub fn borrow_cap(env: Env) -> u128 {
        read_u128(&env, &DataKey::BorrowCap)
    }

    pub fn get_underlying_token(env: Env) -> Address {
        ensure_initialized(&env)
    }

    pub fn get_manager(env: Env) -> Address {
        get_manager(&env)
    }

    pub fn get_admin(env: Env) -> Address {
        get_admin(&env)
    }

    pub fn get_yield_vault(env: Env) -> Option<Address> {
        env.storage().persistent().get(&DataKey::YieldVault)
    }

    // --- internals ------------------------------------------------------

    fn snapshot_of(env: &Env, user: &Address) -> MarketSnapshot {
        MarketSnapshot {
            shares: share_balance(env, user),
            borrow_balance: Self::borrow_balance(env.clone(), user.clone()),
            exchange_rate: Self::exchange_rate(env.clone()),
        }
    }

    fn check_transfer_allowed(env: &Env, from: &Address, shares: u128) {
        let manager = get_manager(env);
        let hint = Self::snapshot_of(env, from);
        let _: Val = env.invoke_contract(
            &manager,
            &Symbol::new(env, "redeem_allowed"),
            (env.current_contract_address(), from.clone(), shares, hint).into_val(env),
        );
    }

    fn redeem_internal(env: &Env, user: &Address, share_amount: u128, amount: u128) {
        let underlying = ensure_initialized(env);
        let balance = share_balance(env, user);
        if share_amount > balance {
            panic!("insufficient balance");
        }
        let manager = get_manager(env);
        let hint = Self::snapshot_of(env, user);
        let _: Val = env.invoke_contract(
            &manager,
            &Symbol::new(env, "redeem_allowed"),
            (
                env.current_contract_address(),
                user.clone(),
                share_amount,
                hint,
            )
                .into_val(env),
        );
        ensure_local_cash(env, &underlying, amount);
        TokenBase::update(env, Some(user), None, to_i128(share_amount));
        emit_burn(env, user, to_i128(share_amount));
        token::Client::new(env, &underlying).transfer(
            &env.current_contract_address(),
            user,
            &to_i128(amount),
        );
        Redeem {
            redeemer: user.clone(),
            redeem_amount: amount,
            redeem_tokens: share_amount,
        }
        .publish(env);
    }

    fn repay_internal(env: &Env, payer: &Address, borrower: &Address, amount: u128) -> u128 {
        let underlying = ensure_initialized(env);
        let owed = Self::borrow_balance(env.clone(), borrower.clone());
        if owed == 0 {
            return 0;
        }
        let repay_amount = if amount == FULL_REPAY {
            owed
        } else {
            amount.min(owed)
        };
        if repay_amount == 0 {
            panic!("zero amount");
        }
        token::Client::new(env, &underlying).transfer(
            payer,
            &env.current_contract_address(),
            &to_i128(repay_amount),
        );
        // Zeroed rather than removed: the rebased snapshot keeps the
        // current index for any later borrow.
        let remaining = owed - repay_amount;
        write_borrow_snapshot(env, borrower, remaining);
        let borrows = read_u128(env, &DataKey::TotalBorrows);
        let new_borrows = borrows.saturating_sub(repay_amount);
        env.storage()
            .persistent()
            .set(&DataKey::TotalBorrows, &new_borrows);
        RepayBorrow {
            payer: payer.clone(),
            borrower: borrower.clone(),
            repay_amount,
            account_borrows: remaining,
            total_borrows: new_borrows,
        }
        .publish(env);
        repay_amount
    }
}

/// Rebase and store a borrower's snapshot at the current index.
fn write_borrow_snapshot(env: &Env, user: &Address, principal: u128) {
    let index = MarketToken::borrow_index(env.clone());
    let snap = BorrowSnapshot {
        principal,
        interest_index: index,
    };
    env.storage()
        .persistent()
        .set(&DataKey::BorrowSnapshots(user.clone()), &snap);
    bump_borrow_snapshot_ttl(env, user);
}

/// Make sure `amount` of underlying sits in the market's own balance,
/// recalling from the yield vault when it does not.
fn ensure_local_cash(env: &Env, underlying: &Address, amount: u128) {
    let local = token_balance(env, underlying, &env.current_contract_address());
    if local >= amount {
        return;
    }
    let shortfall = amount - local;
    let Some(vault) = env
        .storage()
        .persistent()
        .get::<_, Address>(&DataKey::YieldVault)
    else {
        panic!("not enough cash");
    };
    let function = Symbol::new(env, "withdraw_to");
    match try_call_contract::<Val, _>(
        env,
        &vault,
        &function,
        (env.current_contract_address(), shortfall),
    ) {
        Ok(_) => {}
        Err(failure) => {
            report_call_failure(env, &vault, &function, failure, false);
            panic!("not enough cash");
        }
    }
}
