use soroban_sdk::{Address, Env, IntoVal, InvokeError, Symbol, TryFromVal, Val, Vec};

use crate::events::ExternalCallFailed;

/// Why a cross-contract call failed. Carried as a coarse code in the
/// `ExternalCallFailed` event: 0 the callee trapped or reverted, 1 the
/// host refused the invocation outright.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CallFailure {
    Reverted,
    HostRejected,
}

impl CallFailure {
    pub fn code(self) -> u32 {
        match self {
            CallFailure::Reverted => 0,
            CallFailure::HostRejected => 1,
        }
    }
}

pub(crate) fn report_call_failure(
    env: &Env,
    contract: &Address,
    function: &Symbol,
    failure: CallFailure,
    recoverable: bool,
) {
    ExternalCallFailed {
        contract: contract.clone(),
        function: function.clone(),
        recoverable,
        failure_kind: failure.code(),
    }
    .publish(env);
}

/// Invoke `function` on `contract`, folding the host's nested error
/// shape into a [`CallFailure`] so callers can decide what is
/// survivable.
pub(crate) fn try_call_contract<T, A>(
    env: &Env,
    contract: &Address,
    function: &Symbol,
    args: A,
) -> Result<T, CallFailure>
where
    T: TryFromVal<Env, Val>,
    A: IntoVal<Env, Vec<Val>>,
{
    match env.try_invoke_contract::<T, InvokeError>(contract, function, args.into_val(env)) {
        Ok(Ok(val)) => Ok(val),
        Ok(Err(_)) => Err(CallFailure::Reverted),
        Err(_) => Err(CallFailure::HostRejected),
    }
}

/// Variant for calls the market cannot proceed without: emits the
/// failure event, then halts the transition.
pub(crate) fn call_contract_or_panic<T, A>(
    env: &Env,
    contract: &Address,
    func: &str,
    args: A,
) -> T
where
    T: TryFromVal<Env, Val>,
    A: IntoVal<Env, Vec<Val>>,
{
    let function = Symbol::new(env, func);
    match try_call_contract(env, contract, &function, args) {
        Ok(val) => val,
        Err(failure) => {
            report_call_failure(env, contract, &function, failure, false);
            panic!("{} call failed", func);
        }
    }
}
