//! Strike ladder construction.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use ratio_spread_core::{
    ExpiryCalendar, FillStatus, Leg, OptionType, StrategyConfig, StrategyError, SymbolResolver,
};

/// The legs to open for one cycle, in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    pub instrument: String,
    pub expiry: NaiveDate,
    pub spot: Decimal,
    pub atm: Decimal,
    pub legs: Vec<Leg>,
}

/// Nearest multiple of `increment`. Exact halves round away from zero.
#[must_use]
pub fn atm_strike(spot: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return spot;
    }
    (spot / increment).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * increment
}

/// Builds the ladder around `spot` for an entry on `today`.
///
/// No order is placed.
///
/// # Errors
///
/// Returns [`StrategyError::ExpiryNotFound`] when no expiry is exactly
/// `target_dte` days from `today`.
pub fn build_ladder(
    spot: Decimal,
    today: NaiveDate,
    config: &StrategyConfig,
    expiries: &dyn ExpiryCalendar,
    resolver: &dyn SymbolResolver,
) -> Result<Ladder, StrategyError> {
    let expiry = expiries
        .resolve_expiry(today, config.target_dte)
        .ok_or(StrategyError::ExpiryNotFound {
            from_date: today,
            target_dte: config.target_dte,
        })?;

    let atm = atm_strike(spot, config.strike_increment);
    let legs = config
        .strike_offsets
        .iter()
        .zip(&config.sides)
        .zip(config.quantities())
        .enumerate()
        .map(|(i, ((offset, side), quantity))| {
            let strike = atm + Decimal::from(*offset);
            let symbol = resolver.build_symbol(&config.instrument, expiry, strike, OptionType::Ce);
            Leg {
                label: format!("LEG{}_{side}_{}{}", i + 1, strike.normalize(), OptionType::Ce),
                symbol,
                side: *side,
                quantity,
                strike,
                option_type: OptionType::Ce,
                requested_price: None,
                filled_price: None,
                fill_status: FillStatus::Pending,
                order_id: None,
            }
        })
        .collect();

    tracing::info!(
        instrument = %config.instrument,
        %spot,
        %atm,
        %expiry,
        "Strike ladder built"
    );

    Ok(Ladder {
        instrument: config.instrument.clone(),
        expiry,
        spot,
        atm,
        legs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratio_spread_core::Side;
    use rust_decimal_macros::dec;

    struct FixedExpiry(Option<NaiveDate>);

    impl ExpiryCalendar for FixedExpiry {
        fn resolve_expiry(&self, _from: NaiveDate, _dte: i64) -> Option<NaiveDate> {
            self.0
        }
    }

    struct PlainSymbols;

    impl SymbolResolver for PlainSymbols {
        fn build_symbol(&self, instrument: &str, _e: NaiveDate, strike: Decimal, ot: OptionType) -> String {
            format!("{instrument}{strike}{ot}")
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()
    }

    #[test]
    fn atm_rounds_to_nearest_increment() {
        assert_eq!(atm_strike(dec!(26015), dec!(100)), dec!(26000));
        assert_eq!(atm_strike(dec!(26049.99), dec!(100)), dec!(26000));
        assert_eq!(atm_strike(dec!(26050), dec!(100)), dec!(26100));
        assert_eq!(atm_strike(dec!(26120), dec!(50)), dec!(26100));
    }

    #[test]
    fn builds_the_1_3_2_call_ladder() {
        let config = StrategyConfig::nifty_ratio_spread();
        let expiry = NaiveDate::from_ymd_opt(2026, 10, 20);
        let ladder = build_ladder(dec!(26015), today(), &config, &FixedExpiry(expiry), &PlainSymbols).unwrap();

        assert_eq!(ladder.atm, dec!(26000));
        let strikes: Vec<_> = ladder.legs.iter().map(|l| l.strike).collect();
        assert_eq!(strikes, vec![dec!(26200), dec!(26400), dec!(26600)]);
        let quantities: Vec<_> = ladder.legs.iter().map(|l| l.quantity).collect();
        assert_eq!(quantities, vec![50, 150, 100]);
        let sides: Vec<_> = ladder.legs.iter().map(|l| l.side).collect();
        assert_eq!(sides, vec![Side::Buy, Side::Sell, Side::Buy]);
        assert!(ladder.legs.iter().all(|l| l.option_type == OptionType::Ce));
        assert_eq!(ladder.legs[1].label, "LEG2_SELL_26400CE");
        assert_eq!(ladder.legs[1].symbol, "NIFTY26400CE");
    }

    #[test]
    fn no_exact_expiry_fails() {
        let config = StrategyConfig::nifty_ratio_spread();
        let err = build_ladder(dec!(26015), today(), &config, &FixedExpiry(None), &PlainSymbols).unwrap_err();
        assert!(matches!(err, StrategyError::ExpiryNotFound { .. }));
    }
}
