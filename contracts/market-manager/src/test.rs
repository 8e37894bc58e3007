#![cfg(test)]
extern crate std;

use crate::{MarketManager, MarketManagerClient};
use jump_rate_model::{JumpRateModel, JumpRateModelClient};
use market_math::SCALE_1E18;
use market_token::{MarketToken, MarketTokenClient};
use mock_price_adaptor::{MockPriceAdaptor, MockPriceAdaptorClient};
use oracle_router::{AdaptorConfig, OracleRouter, OracleRouterClient};
use soroban_sdk::testutils::{Address as _, Ledger};
use soroban_sdk::{token, vec, Address, Env, String};

// mock feed prices at 14 decimals
const ONE_USD: i128 = 100_000_000_000_000;
const FORTY_CENTS: i128 = 40_000_000_000_000;

struct Setup<'a> {
    env: Env,
    admin: Address,
    usdc: Address,
    xlm: Address,
    usdc_sac: token::StellarAssetClient<'a>,
    xlm_sac: token::StellarAssetClient<'a>,
    adaptor: MockPriceAdaptorClient<'a>,
    manager: MarketManagerClient<'a>,
    usdc_market: MarketTokenClient<'a>,
    xlm_market: MarketTokenClient<'a>,
}

fn register_market<'a>(
    env: &Env,
    underlying: &Address,
    manager: &Address,
    model: &Address,
    admin: &Address,
    name: &str,
    symbol: &str,
) -> MarketTokenClient<'a> {
    let id = env.register(MarketToken, ());
    let market = MarketTokenClient::new(env, &id);
    market.initialize(
        underlying,
        manager,
        model,
        admin,
        &String::from_str(env, name),
        &String::from_str(env, symbol),
        &SCALE_1E18,
        &(SCALE_1E18 / 10),
        &(SCALE_1E18 * 28 / 1000),
    );
    market
}

/// Two listed markets over real assets: USDC at $1.00 and XLM at $1.00
/// to start, both with cf 0.5 / lt 0.75, one shared mock feed.
fn setup() -> Setup<'static> {
    let env = Env::default();
    env.mock_all_auths();
    env.ledger().with_mut(|l| {
        l.timestamp = 1_000_000;
        l.sequence_number = 100;
    });
    let admin = Address::generate(&env);

    let usdc_sac = env.register_stellar_asset_contract_v2(admin.clone());
    let xlm_sac = env.register_stellar_asset_contract_v2(admin.clone());
    let usdc = usdc_sac.address();
    let xlm = xlm_sac.address();

    let adaptor_id = env.register(MockPriceAdaptor, ());
    let adaptor = MockPriceAdaptorClient::new(&env, &adaptor_id);
    adaptor.initialize(&14u32);
    adaptor.set_price(&usdc, &ONE_USD);
    adaptor.set_price(&xlm, &ONE_USD);

    let router_id = env.register(OracleRouter, ());
    let router = OracleRouterClient::new(&env, &router_id);
    router.initialize(&admin);
    for asset in [&usdc, &xlm] {
        router.set_adaptor(
            asset,
            &AdaptorConfig {
                primary: adaptor_id.clone(),
                secondary: None,
                max_age_secs: 600,
                max_divergence: SCALE_1E18 / 50,
            },
        );
    }

    let manager_id = env.register(MarketManager, ());
    let manager = MarketManagerClient::new(&env, &manager_id);
    manager.initialize(&admin, &router_id);

    let model_id = env.register(JumpRateModel, ());
    JumpRateModelClient::new(&env, &model_id).initialize(
        &(SCALE_1E18 / 50),
        &(SCALE_1E18 * 18 / 100),
        &(SCALE_1E18 * 4),
        &(SCALE_1E18 * 8 / 10),
        &admin,
    );

    let usdc_market = register_market(&env, &usdc, &manager_id, &model_id, &admin, "Market USDC", "mUSDC");
    let xlm_market = register_market(&env, &xlm, &manager_id, &model_id, &admin, "Market XLM", "mXLM");
    for market in [&usdc_market, &xlm_market] {
        manager.list_market(&market.address);
        manager.update_collateral_token(
            &market.address,
            &(SCALE_1E18 / 2),
            &(SCALE_1E18 * 3 / 4),
        );
    }

    Setup {
        usdc_sac: token::StellarAssetClient::new(&env, &usdc),
        xlm_sac: token::StellarAssetClient::new(&env, &xlm),
        env,
        admin,
        usdc,
        xlm,
        adaptor,
        manager,
        usdc_market,
        xlm_market,
    }
}

/// Supplier seeds the USDC market; borrower posts 1000 XLM and draws
/// 400 USDC against it.
fn setup_with_position() -> (Setup<'static>, Address) {
    let s = setup();
    let supplier = Address::generate(&s.env);
    let borrower = Address::generate(&s.env);
    s.usdc_sac.mint(&supplier, &1_000i128);
    s.xlm_sac.mint(&borrower, &1_000i128);

    s.usdc_market.mint(&supplier, &1_000u128);
    s.xlm_market.mint(&borrower, &1_000u128);
    s.manager
        .enter_markets(&borrower, &vec![&s.env, s.xlm_market.address.clone()]);
    s.usdc_market.borrow(&borrower, &400u128);
    (s, borrower)
}

#[test]
fn listing_and_membership() {
    let s = setup();
    let user = Address::generate(&s.env);
    assert_eq!(s.manager.markets().len(), 2);
    let config = s.manager.market_config(&s.xlm_market.address).unwrap();
    assert!(config.listed);
    assert_eq!(config.underlying, s.xlm);
    assert_eq!(config.collateral_factor, SCALE_1E18 / 2);

    s.manager
        .enter_markets(&user, &vec![&s.env, s.xlm_market.address.clone()]);
    assert_eq!(s.manager.user_markets(&user).len(), 1);
    // re-entering is a no-op
    s.manager
        .enter_markets(&user, &vec![&s.env, s.xlm_market.address.clone()]);
    assert_eq!(s.manager.user_markets(&user).len(), 1);

    s.manager.exit_market(&user, &s.xlm_market.address);
    assert_eq!(s.manager.user_markets(&user).len(), 0);
}

#[test]
#[should_panic(expected = "market already listed")]
fn rejects_double_listing() {
    let s = setup();
    s.manager.list_market(&s.xlm_market.address);
}

#[test]
#[should_panic(expected = "market not listed")]
fn enter_rejects_unlisted() {
    let s = setup();
    let user = Address::generate(&s.env);
    let stranger = Address::generate(&s.env);
    s.manager.enter_markets(&user, &vec![&s.env, stranger]);
}

#[test]
#[should_panic(expected = "invalid collateral factor")]
fn collateral_factor_must_stay_below_threshold() {
    let s = setup();
    s.manager.update_collateral_token(
        &s.xlm_market.address,
        &(SCALE_1E18 * 3 / 4),
        &(SCALE_1E18 * 3 / 4),
    );
}

#[test]
fn risk_off_reset_clears_weights() {
    let s = setup();
    let bob = Address::generate(&s.env);
    s.xlm_sac.mint(&bob, &1_000i128);
    s.xlm_market.mint(&bob, &1_000u128);
    s.manager
        .enter_markets(&bob, &vec![&s.env, s.xlm_market.address.clone()]);
    assert_eq!(s.manager.account_liquidity(&bob), (500, 0));

    s.manager
        .update_collateral_token(&s.xlm_market.address, &0u128, &0u128);
    let config = s.manager.market_config(&s.xlm_market.address).unwrap();
    assert_eq!(config.collateral_factor, 0);
    assert_eq!(config.liquidation_threshold, 0);
    // deposits stop counting as collateral once the weights are zeroed
    assert_eq!(s.manager.account_liquidity(&bob), (0, 0));
}

#[test]
#[should_panic(expected = "invalid collateral factor")]
fn zero_threshold_needs_zero_factor() {
    let s = setup();
    s.manager
        .update_collateral_token(&s.xlm_market.address, &(SCALE_1E18 / 2), &0u128);
}

#[test]
#[should_panic(expected = "invalid liquidation threshold")]
fn liquidation_threshold_is_capped() {
    let s = setup();
    s.manager.update_collateral_token(
        &s.xlm_market.address,
        &(SCALE_1E18 / 2),
        &(SCALE_1E18 * 95 / 100),
    );
}

#[test]
fn liquidity_and_status_are_exclusive() {
    let (s, borrower) = setup_with_position();
    // 1000 XLM * $1 * 0.5 = 500 borrow power vs 400 debt
    assert_eq!(s.manager.account_liquidity(&borrower), (100, 0));
    // threshold basis: 1000 * 0.75 - 400
    assert_eq!(s.manager.liquidation_status(&borrower), (350, 0));

    s.adaptor.set_price(&s.xlm, &FORTY_CENTS);
    // 1000 * $0.40 * 0.5 = 200 vs 400 debt
    assert_eq!(s.manager.account_liquidity(&borrower), (0, 200));
    assert_eq!(s.manager.liquidation_status(&borrower), (0, 100));
}

#[test]
#[should_panic(expected = "borrow not allowed")]
fn borrow_blocked_beyond_collateral_power() {
    let s = setup();
    let supplier = Address::generate(&s.env);
    let borrower = Address::generate(&s.env);
    s.usdc_sac.mint(&supplier, &1_000i128);
    s.xlm_sac.mint(&borrower, &1_000i128);
    s.usdc_market.mint(&supplier, &1_000u128);
    s.xlm_market.mint(&borrower, &1_000u128);
    s.manager
        .enter_markets(&borrower, &vec![&s.env, s.xlm_market.address.clone()]);
    s.usdc_market.borrow(&borrower, &600u128);
}

#[test]
fn borrow_auto_enters_debt_market() {
    let (s, borrower) = setup_with_position();
    let memberships = s.manager.user_markets(&borrower);
    assert!(memberships.contains(s.usdc_market.address.clone()));
    assert!(memberships.contains(s.xlm_market.address.clone()));
}

#[test]
#[should_panic(expected = "redeem not allowed")]
fn redeem_blocked_when_collateral_is_needed() {
    let (s, borrower) = setup_with_position();
    s.xlm_market.redeem(&borrower, &900u128);
}

#[test]
#[should_panic(expected = "nonzero borrow balance")]
fn exit_blocked_with_open_debt() {
    let (s, borrower) = setup_with_position();
    s.manager.exit_market(&borrower, &s.usdc_market.address);
}

#[test]
#[should_panic(expected = "insufficient collateral")]
fn exit_blocked_when_collateral_backs_debt() {
    let (s, borrower) = setup_with_position();
    s.manager.exit_market(&borrower, &s.xlm_market.address);
}

#[test]
fn exit_allowed_after_repay() {
    let (s, borrower) = setup_with_position();
    s.usdc_market.repay(&borrower, &u128::MAX);
    s.manager.exit_market(&borrower, &s.xlm_market.address);
    s.manager.exit_market(&borrower, &s.usdc_market.address);
    assert_eq!(s.manager.user_markets(&borrower).len(), 0);
}

#[test]
fn liquidation_seizes_at_the_incentive() {
    let (s, borrower) = setup_with_position();
    let liquidator = Address::generate(&s.env);
    s.usdc_sac.mint(&liquidator, &200i128);

    s.adaptor.set_price(&s.xlm, &FORTY_CENTS);
    s.manager.liquidate(
        &liquidator,
        &borrower,
        &s.usdc_market.address,
        &s.xlm_market.address,
        &100u128,
    );

    // $100 repaid * 1.08 incentive / $0.40 = 270 XLM of collateral,
    // 2.8% of which (7 shares, floored) goes to reserves
    assert_eq!(s.usdc_market.borrow_balance(&borrower), 300);
    assert_eq!(s.xlm_market.balance(&liquidator), 263);
    assert_eq!(s.xlm_market.balance(&borrower), 730);
    assert_eq!(s.xlm_market.total_reserves(), 7);
    let usdc = token::Client::new(&s.env, &s.usdc);
    assert_eq!(usdc.balance(&liquidator), 100);
}

#[test]
#[should_panic(expected = "liquidate not allowed")]
fn liquidation_rejected_while_healthy() {
    let (s, borrower) = setup_with_position();
    let liquidator = Address::generate(&s.env);
    s.usdc_sac.mint(&liquidator, &200i128);
    s.manager.liquidate(
        &liquidator,
        &borrower,
        &s.usdc_market.address,
        &s.xlm_market.address,
        &100u128,
    );
}

#[test]
#[should_panic(expected = "too much repay")]
fn liquidation_bounded_by_close_factor() {
    let (s, borrower) = setup_with_position();
    let liquidator = Address::generate(&s.env);
    s.usdc_sac.mint(&liquidator, &300i128);
    s.adaptor.set_price(&s.xlm, &FORTY_CENTS);
    // close factor 0.5 of the 400 owed
    s.manager.liquidate(
        &liquidator,
        &borrower,
        &s.usdc_market.address,
        &s.xlm_market.address,
        &201u128,
    );
}

#[test]
#[should_panic(expected = "self liquidation not allowed")]
fn borrower_cannot_liquidate_themselves() {
    let (s, borrower) = setup_with_position();
    s.manager.liquidate(
        &borrower,
        &borrower,
        &s.usdc_market.address,
        &s.xlm_market.address,
        &100u128,
    );
}

#[test]
#[should_panic(expected = "markets must differ")]
fn liquidation_needs_two_markets() {
    let (s, borrower) = setup_with_position();
    let liquidator = Address::generate(&s.env);
    s.manager.liquidate(
        &liquidator,
        &borrower,
        &s.usdc_market.address,
        &s.usdc_market.address,
        &100u128,
    );
}

#[test]
#[should_panic(expected = "liquidation paused")]
fn liquidation_pause_blocks() {
    let (s, borrower) = setup_with_position();
    let liquidator = Address::generate(&s.env);
    s.usdc_sac.mint(&liquidator, &200i128);
    s.adaptor.set_price(&s.xlm, &FORTY_CENTS);
    s.manager.set_liquidate_paused(&s.admin, &true);
    s.manager.liquidate(
        &liquidator,
        &borrower,
        &s.usdc_market.address,
        &s.xlm_market.address,
        &100u128,
    );
}

#[test]
fn guardian_can_pause_but_not_unpause() {
    let s = setup();
    let guardian = Address::generate(&s.env);
    s.manager.set_pause_guardian(&guardian);

    s.manager
        .set_mint_paused(&guardian, &s.usdc_market.address, &true);
    let res = s
        .manager
        .try_set_mint_paused(&guardian, &s.usdc_market.address, &false);
    assert!(res.is_err());

    s.manager
        .set_mint_paused(&s.admin, &s.usdc_market.address, &false);
    let user = Address::generate(&s.env);
    s.usdc_sac.mint(&user, &100i128);
    s.usdc_market.mint(&user, &100u128);
    assert_eq!(s.usdc_market.balance(&user), 100);
}

#[test]
#[should_panic(expected = "mint paused")]
fn paused_market_rejects_mint() {
    let s = setup();
    s.manager
        .set_mint_paused(&s.admin, &s.usdc_market.address, &true);
    let user = Address::generate(&s.env);
    s.usdc_sac.mint(&user, &100i128);
    s.usdc_market.mint(&user, &100u128);
}

#[test]
#[should_panic(expected = "borrow paused")]
fn paused_market_rejects_borrow() {
    let (s, borrower) = setup_with_position();
    s.manager
        .set_borrow_paused(&s.admin, &s.usdc_market.address, &true);
    s.usdc_market.borrow(&borrower, &10u128);
}

#[test]
#[should_panic(expected = "not authorized")]
fn random_caller_cannot_pause() {
    let s = setup();
    let stranger = Address::generate(&s.env);
    s.manager
        .set_mint_paused(&stranger, &s.usdc_market.address, &true);
}

#[test]
#[should_panic(expected = "invalid close factor")]
fn close_factor_must_be_positive() {
    let s = setup();
    s.manager.set_close_factor(&0u128);
}

#[test]
#[should_panic(expected = "invalid liquidation incentive")]
fn incentive_must_cover_principal() {
    let s = setup();
    s.manager.set_liquidation_incentive(&(SCALE_1E18 - 1));
}

#[test]
fn stale_collateral_price_zeroes_its_value() {
    let (s, borrower) = setup_with_position();
    s.adaptor
        .set_price_at(&s.xlm, &ONE_USD, &(1_000_000 - 601));
    // collateral is ignored, the USDC debt still counts
    assert_eq!(s.manager.liquidation_status(&borrower), (0, 400));
}

#[test]
#[should_panic(expected = "borrow not allowed")]
fn stale_collateral_price_blocks_new_borrows() {
    let (s, borrower) = setup_with_position();
    s.adaptor
        .set_price_at(&s.xlm, &ONE_USD, &(1_000_000 - 601));
    s.usdc_market.borrow(&borrower, &1u128);
}

#[test]
#[should_panic(expected = "price unavailable")]
fn strict_policy_rejects_flagged_quotes() {
    let (s, borrower) = setup_with_position();
    s.manager.set_strict_oracle_policy(&true);
    s.adaptor
        .set_price_at(&s.xlm, &ONE_USD, &(1_000_000 - 601));
    s.manager.account_liquidity(&borrower);
}

#[test]
#[should_panic(expected = "price unavailable")]
fn unpriced_debt_always_aborts() {
    let (s, borrower) = setup_with_position();
    s.adaptor.clear_price(&s.usdc);
    s.manager.account_liquidity(&borrower);
}

#[test]
#[should_panic(expected = "price unavailable")]
fn liquidation_needs_fresh_prices() {
    let (s, borrower) = setup_with_position();
    let liquidator = Address::generate(&s.env);
    s.usdc_sac.mint(&liquidator, &200i128);
    // drop the price, then let the quote go stale
    s.adaptor
        .set_price_at(&s.xlm, &FORTY_CENTS, &(1_000_000 - 601));
    s.manager.liquidate(
        &liquidator,
        &borrower,
        &s.usdc_market.address,
        &s.xlm_market.address,
        &100u128,
    );
}
