use proptest::prelude::*;
use quote_infra::price_infra::ReconnectPolicy;
use quote_infra::types::price::Price;
use quote_infra::types::symbol::Symbol;
use quote_infra::utils::helper::exponential_backoff;
use std::time::Duration;

proptest! {
    #[test]
    fn backoff_is_capped_and_non_decreasing(
        base_ms in 1u64..5_000,
        cap_ms in 1u64..120_000,
        attempt in 0u32..64,
    ) {
        let base = Duration::from_millis(base_ms);
        let cap = Duration::from_millis(cap_ms.max(base_ms));

        let current = exponential_backoff(base, attempt, cap);
        let next = exponential_backoff(base, attempt + 1, cap);

        prop_assert!(current <= cap);
        prop_assert!(next >= current);
        if attempt == 0 {
            prop_assert_eq!(current, base);
        }
    }

    #[test]
    fn policy_delay_matches_formula(attempt in 0u32..10) {
        let policy = ReconnectPolicy::default();
        let expected = Duration::from_secs((1u64 << attempt).min(30));
        prop_assert_eq!(policy.delay(attempt), expected);
    }

    #[test]
    fn symbols_are_canonical_and_stable(raw in "[a-zA-Z0-9]{1,10}", pad in " {0,3}") {
        let symbol = Symbol::parse(&format!("{pad}{raw}{pad}")).unwrap();

        prop_assert_eq!(symbol.as_str(), raw.to_uppercase());
        prop_assert_eq!(Symbol::parse(symbol.as_str()).unwrap(), symbol.clone());
        let paired = Symbol::parse(&symbol.pair("/", "usdt")).unwrap();
        prop_assert_eq!(paired, symbol);
    }

    #[test]
    fn non_negative_prices_keep_eight_decimals(value in 0.0f64..10_000_000.0) {
        let price = Price::from_f64(value).unwrap();
        prop_assert!((price.to_f64() - value).abs() <= 1e-8 + value * f64::EPSILON * 8.0);
    }

    #[test]
    fn negative_prices_are_rejected(value in -1_000_000.0f64..-1e-9) {
        prop_assert!(Price::from_f64(value).is_err());
    }
}
