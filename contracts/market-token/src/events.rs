use soroban_sdk::{contractevent, Address, Symbol};

/// Emitted on deposit when market shares are minted.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mint {
    #[topic]
    pub minter: Address,
    pub mint_amount: u128,
    pub mint_tokens: u128,
}

/// Emitted on withdrawal when market shares are burned.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Redeem {
    #[topic]
    pub redeemer: Address,
    pub redeem_amount: u128,
    pub redeem_tokens: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BorrowEvent {
    #[topic]
    pub borrower: Address,
    pub borrow_amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepayBorrow {
    #[topic]
    pub payer: Address,
    #[topic]
    pub borrower: Address,
    pub repay_amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

/// Emitted once per ledger that interest actually accrues.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccrueInterest {
    pub interest_accumulated: u128,
    pub borrow_index: u128,
    pub total_borrows: u128,
}

/// Emitted when collateral shares move to a liquidator. The protocol
/// slice is burned and its value booked as reserves.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SeizeCollateral {
    #[topic]
    pub borrower: Address,
    #[topic]
    pub liquidator: Address,
    pub seize_tokens: u128,
    pub protocol_tokens: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReservesAdded {
    #[topic]
    pub benefactor: Address,
    pub add_amount: u128,
    pub total_reserves: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReservesReduced {
    pub reduce_amount: u128,
    pub total_reserves: u128,
}

/// Yield pulled in from the external vault.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct YieldHarvested {
    pub amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewAdmin {
    #[topic]
    pub admin: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewManager {
    #[topic]
    pub manager: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewInterestModel {
    #[topic]
    pub model: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewReserveFactor {
    pub reserve_factor: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewProtocolSeizeShare {
    pub protocol_seize_share: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewSupplyCap {
    pub supply_cap: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewBorrowCap {
    pub borrow_cap: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewYieldVault {
    #[topic]
    pub vault: Address,
}

/// Records recoverable vs fatal external contract call failures.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExternalCallFailed {
    #[topic]
    pub contract: Address,
    #[topic]
    pub function: Symbol,
    pub recoverable: bool,
    pub failure_kind: u32,
}

/// Emitted before halting when interest math cannot be represented.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InterestOverflow {
    pub total_borrows: u128,
    pub rate_per_ledger: u128,
    pub elapsed: u128,
}
