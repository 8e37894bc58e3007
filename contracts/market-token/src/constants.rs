pub const SHARE_DECIMALS: u32 = 7;
/// Per-ledger borrow rate ceiling (1e18). Every rate a model returns is
/// re-checked against this at accrual time; a model quoting above it is
/// broken or compromised and the market halts.
pub const MAX_BORROW_RATE: u128 = 5_000_000_000_000u128;
/// Sentinel repay amount meaning "everything owed".
pub const FULL_REPAY: u128 = u128::MAX;
