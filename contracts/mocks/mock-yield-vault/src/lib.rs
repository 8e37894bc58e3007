#![no_std]
use soroban_sdk::{contract, contractimpl, contracttype, token, Address, Env};

#[contracttype]
pub enum DataKey {
    Token,
    Controller,
    Deposited,
    PendingYield,
}

/// Test stand-in for an external yield source. Holds deposited tokens,
/// reports them via `total_assets`, and pays out a manually staged yield
/// on `harvest`. Only the configured controller may pull funds.
#[contract]
pub struct MockYieldVault;

#[contractimpl]
impl MockYieldVault {
    pub fn initialize(env: Env, token: Address, controller: Address) {
        env.storage().persistent().set(&DataKey::Token, &token);
        env.storage()
            .persistent()
            .set(&DataKey::Controller, &controller);
        env.storage().persistent().set(&DataKey::Deposited, &0u128);
        env.storage()
            .persistent()
            .set(&DataKey::PendingYield, &0u128);
    }

    pub fn deposit(env: Env, from: Address, amount: u128) {
        from.require_auth();
        let token_addr: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Token)
            .unwrap_or_else(|| panic!("vault not initialized"));
        token::Client::new(&env, &token_addr).transfer(
            &from,
            &env.current_contract_address(),
            &(amount as i128),
        );
        let deposited: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::Deposited)
            .unwrap_or(0);
        env.storage()
            .persistent()
            .set(&DataKey::Deposited, &(deposited + amount));
    }

    pub fn withdraw_to(env: Env, to: Address, amount: u128) {
        let controller: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Controller)
            .unwrap_or_else(|| panic!("vault not initialized"));
        controller.require_auth();
        let deposited: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::Deposited)
            .unwrap_or(0);
        if amount > deposited {
            panic!("insufficient vault balance");
        }
        env.storage()
            .persistent()
            .set(&DataKey::Deposited, &(deposited - amount));
        let token_addr: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Token)
            .unwrap_or_else(|| panic!("vault not initialized"));
        token::Client::new(&env, &token_addr).transfer(
            &env.current_contract_address(),
            &to,
            &(amount as i128),
        );
    }

    pub fn total_assets(env: Env) -> u128 {
        env.storage()
            .persistent()
            .get(&DataKey::Deposited)
            .unwrap_or(0)
    }

    /// Test hook: stage yield for the next harvest. The backing tokens
    /// must already sit in the vault.
    pub fn set_pending_yield(env: Env, amount: u128) {
        env.storage()
            .persistent()
            .set(&DataKey::PendingYield, &amount);
    }

    pub fn harvest(env: Env, to: Address) -> u128 {
        let controller: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Controller)
            .unwrap_or_else(|| panic!("vault not initialized"));
        controller.require_auth();
        let pending: u128 = env
            .storage()
            .persistent()
            .get(&DataKey::PendingYield)
            .unwrap_or(0);
        if pending == 0 {
            return 0;
        }
        env.storage().persistent().set(&DataKey::PendingYield, &0u128);
        let token_addr: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Token)
            .unwrap_or_else(|| panic!("vault not initialized"));
        token::Client::new(&env, &token_addr).transfer(
            &env.current_contract_address(),
            &to,
            &(pending as i128),
        );
        pending
    }
}
