use soroban_sdk::{contracttype, Address, Env, IntoVal};
use stellar_tokens::fungible::Base as TokenBase;

#[contracttype]
pub enum DataKey {
    UnderlyingToken,
    Manager,
    InterestModel,
    Admin,
    TotalBorrows,             // u128
    TotalReserves,            // u128
    BorrowIndex,              // u128 scaled 1e18, starts at 1e18
    AccrualLedger,            // u32, ledger sequence of the last accrual
    ReserveFactor,            // u128 scaled 1e18
    ProtocolSeizeShare,       // u128 scaled 1e18, slice of seizures kept as reserves
    InitialExchangeRate,      // u128 scaled 1e18, used while total supply is zero
    BorrowSnapshots(Address), // BorrowSnapshot per borrower
    SupplyCap,                // u128 underlying, 0 disables
    BorrowCap,                // u128 underlying, 0 disables
    YieldVault,               // Address (optional)
    Initialized,              // bool
}

const TTL_THRESHOLD: u32 = 100_000;
const TTL_EXTEND_TO: u32 = 200_000;

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BorrowSnapshot {
    pub principal: u128,
    pub interest_index: u128,
}

/// The calling market's view of one account, handed to the manager with
/// every gating call. The host forbids the manager calling back into the
/// market that is mid-operation, so the market supplies its own numbers.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketSnapshot {
    pub shares: u128,
    pub borrow_balance: u128,
    pub exchange_rate: u128,
}

pub fn ensure_initialized(env: &Env) -> Address {
    bump_core_ttl(env);
    env.storage()
        .persistent()
        .get(&DataKey::UnderlyingToken)
        .unwrap_or_else(|| panic!("market not initialized"))
}

pub fn read_u128(env: &Env, key: &DataKey) -> u128 {
    env.storage().persistent().get(key).unwrap_or(0)
}

pub fn get_manager(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::Manager)
        .unwrap_or_else(|| panic!("manager not set"))
}

pub fn get_admin(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::Admin)
        .unwrap_or_else(|| panic!("admin not set"))
}

pub fn bump_core_ttl(env: &Env) {
    let persistent = env.storage().persistent();
    if persistent.has(&DataKey::Admin) {
        persistent.extend_ttl(&DataKey::Admin, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::UnderlyingToken) {
        persistent.extend_ttl(&DataKey::UnderlyingToken, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Manager) {
        persistent.extend_ttl(&DataKey::Manager, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::Initialized) {
        persistent.extend_ttl(&DataKey::Initialized, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

pub fn bump_market_ttl(env: &Env) {
    let persistent = env.storage().persistent();
    if persistent.has(&DataKey::TotalBorrows) {
        persistent.extend_ttl(&DataKey::TotalBorrows, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::TotalReserves) {
        persistent.extend_ttl(&DataKey::TotalReserves, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::BorrowIndex) {
        persistent.extend_ttl(&DataKey::BorrowIndex, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
    if persistent.has(&DataKey::AccrualLedger) {
        persistent.extend_ttl(&DataKey::AccrualLedger, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

pub fn bump_borrow_snapshot_ttl(env: &Env, user: &Address) {
    let persistent = env.storage().persistent();
    let key = DataKey::BorrowSnapshots(user.clone());
    if persistent.has(&key) {
        persistent.extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    }
}

pub fn share_balance(env: &Env, addr: &Address) -> u128 {
    let bal = TokenBase::balance(env, addr);
    if bal < 0 {
        panic!("negative shares");
    }
    bal as u128
}

pub fn total_shares(env: &Env) -> u128 {
    let supply = TokenBase::total_supply(env);
    if supply < 0 {
        panic!("negative supply");
    }
    supply as u128
}

pub fn token_balance(env: &Env, token: &Address, owner: &Address) -> u128 {
    use soroban_sdk::{InvokeError, Symbol, Val, Vec};
    let args: Vec<Val> = (owner.clone(),).into_val(env);
    let sym_balance = Symbol::new(env, "balance");
    let bal = match env.try_invoke_contract::<i128, InvokeError>(token, &sym_balance, args.clone())
    {
        Ok(Ok(result)) => result,
        _ => {
            let sym_balance_of = Symbol::new(env, "balance_of");
            match env.try_invoke_contract::<i128, InvokeError>(token, &sym_balance_of, args) {
                Ok(Ok(result)) => result,
                _ => panic!("balance lookup failed"),
            }
        }
    };
    if bal < 0 {
        0
    } else {
        bal as u128
    }
}

pub fn to_i128(amount: u128) -> i128 {
    if amount > i128::MAX as u128 {
        panic!("amount exceeds i128");
    }
    amount as i128
}
