//! Normalising trades into directional conversions.

use crate::config::LedgerConfig;
use crate::domain::{Action, Asset, Conversion, Decimal, FeeLeg, Notes, Trade};

/// Turns an exchange-style trade (base/quote, buy/sell) into a flow from one
/// asset into another with every amount already rounded.
#[derive(Debug, Clone)]
pub struct TradeResolver {
    reference_currency: Asset,
    default_decimals: u32,
}

struct Leg<'a> {
    asset: &'a Asset,
    decimals: u32,
    fee: FeeLeg,
}

impl TradeResolver {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            reference_currency: config.reference_currency.clone(),
            default_decimals: config.default_decimals,
        }
    }

    fn decimals(&self, declared: u32) -> u32 {
        if declared == 0 {
            self.default_decimals
        } else {
            declared
        }
    }

    /// Fee legs are sign-normalised; the reference value is rounded to 4 dp.
    fn normalise_fee(&self, leg: &FeeLeg) -> FeeLeg {
        let decimals = self.decimals(leg.decimals);
        FeeLeg {
            currency: leg.currency.clone(),
            amount: leg.amount.abs().round_dp(decimals),
            amount_ref: leg.amount_ref.abs().round_ref(),
            decimals,
        }
    }

    /// `amount` net of the leg's fee when the fee is charged in the leg's asset.
    fn net(amount: Decimal, leg: &Leg<'_>) -> Decimal {
        if leg.fee.currency.is_empty() || &leg.fee.currency == leg.asset {
            (amount - leg.fee.amount).round_dp(leg.decimals)
        } else {
            amount
        }
    }

    /// Returns `None` for trades whose action cannot be classified.
    pub fn resolve(&self, trade: &Trade, id: String) -> Option<Conversion> {
        let base_dp = self.decimals(trade.base_decimals);
        let quote_dp = self.decimals(trade.quote_decimals);
        let fee = self.normalise_fee(&trade.fee);
        let quote_fee = self.normalise_fee(&trade.quote_fee);
        let fee_ref = (fee.amount_ref + quote_fee.amount_ref).round_ref();

        let (to, from, price, price_ref, to_amount, to_amount_ref, from_amount, from_amount_ref) =
            match trade.action {
                Action::Buy => {
                    let to = Leg {
                        asset: &trade.base_asset,
                        decimals: base_dp,
                        fee,
                    };
                    let from = Leg {
                        asset: &trade.quote_asset,
                        decimals: quote_dp,
                        fee: quote_fee,
                    };
                    (
                        to,
                        from,
                        trade.price.round_dp(quote_dp),
                        trade.price_ref.round_ref(),
                        trade.amount.round_dp(base_dp),
                        (trade.amount * trade.price_ref).round_ref(),
                        trade.value.round_dp(quote_dp),
                        trade.value_ref.round_ref(),
                    )
                }
                Action::Sell => {
                    let from_amount_ref = if trade.base_asset == self.reference_currency {
                        trade.amount
                    } else if trade.quote_price_ref.is_positive() {
                        trade.value * trade.quote_price_ref
                    } else {
                        trade.value_ref
                    };
                    let to = Leg {
                        asset: &trade.quote_asset,
                        decimals: quote_dp,
                        fee: quote_fee,
                    };
                    let from = Leg {
                        asset: &trade.base_asset,
                        decimals: base_dp,
                        fee,
                    };
                    (
                        to,
                        from,
                        Decimal::one().safe_div(trade.price).round_dp(base_dp),
                        trade.quote_price_ref.round_ref(),
                        trade.value.round_dp(quote_dp),
                        (trade.value * trade.quote_price_ref).round_ref(),
                        trade.amount.round_dp(base_dp),
                        from_amount_ref.round_ref(),
                    )
                }
                Action::Unknown => return None,
            };

        Some(Conversion {
            id,
            ts: trade.ts,
            account: trade.account.clone(),
            action: trade.action,

            from_asset: from.asset.clone(),
            from_decimals: from.decimals,
            from_amount,
            from_amount_net: Self::net(from_amount, &from),
            from_amount_ref,
            from_amount_net_ref: (from_amount_ref - from.fee.amount_ref).round_ref(),

            to_asset: to.asset.clone(),
            to_decimals: to.decimals,
            to_amount,
            to_amount_net: Self::net(to_amount, &to),
            to_amount_ref,
            to_amount_net_ref: (to_amount_ref - to.fee.amount_ref).round_ref(),

            price,
            price_ref,
            fee_ref,

            is_margin_trade: trade.is_margin_trade,
            is_derivative: trade.is_derivative,
            is_physical: trade.is_physical,
            sub_ledger: None,

            entries: Vec::new(),
            ledger_before: Vec::new(),
            ledger_after: Vec::new(),
            result: None,
            notes: Notes::default(),
            from_fee: from.fee,
            to_fee: to.fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, TimeMs};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn fee(currency: &str, amount: &str, amount_ref: &str) -> FeeLeg {
        FeeLeg {
            currency: Asset::new(currency),
            amount: d(amount),
            amount_ref: d(amount_ref),
            decimals: 0,
        }
    }

    fn trade(action: Action, base: &str, quote: &str) -> Trade {
        Trade {
            ts: TimeMs::new(1_000),
            account: Account::new("A"),
            action,
            base_asset: Asset::new(base),
            quote_asset: Asset::new(quote),
            base_decimals: 0,
            quote_decimals: 0,
            amount: Decimal::zero(),
            price: Decimal::zero(),
            price_ref: Decimal::zero(),
            value: Decimal::zero(),
            value_ref: Decimal::zero(),
            quote_price_ref: Decimal::zero(),
            fee: FeeLeg::default(),
            quote_fee: FeeLeg::default(),
            is_margin_trade: false,
            is_derivative: false,
            is_physical: false,
            tx_id: String::new(),
        }
    }

    fn resolver() -> TradeResolver {
        TradeResolver::new(&LedgerConfig::default())
    }

    #[test]
    fn buy_pays_quote_for_base() {
        let mut t = trade(Action::Buy, "ETH", "BTC");
        t.amount = d("40");
        t.price = d("0.05");
        t.price_ref = d("20");
        t.value = d("2");
        t.value_ref = d("800");
        t.fee = fee("BTC", "-0.02", "-8");

        let c = resolver().resolve(&t, "t1".to_string()).unwrap();
        assert_eq!(c.to_asset, Asset::new("ETH"));
        assert_eq!(c.from_asset, Asset::new("BTC"));
        assert_eq!(c.to_amount, d("40"));
        assert_eq!(c.to_amount_ref, d("800"));
        assert_eq!(c.from_amount, d("2"));
        assert_eq!(c.from_amount_ref, d("800"));
        assert_eq!(c.price, d("0.05"));
        assert_eq!(c.price_ref, d("20"));
        assert_eq!(c.fee_ref, d("8"));
        assert_eq!(c.to_fee.amount, d("0.02"));
        assert_eq!(c.to_fee.decimals, 8);
        // The fee is paid in BTC, not ETH, so the received amount is untouched.
        assert_eq!(c.to_amount_net, d("40"));
        assert_eq!(c.to_amount_net_ref, d("792"));
        assert_eq!(c.from_amount_net_ref, d("800"));
        assert!(c.result.is_none());
    }

    #[test]
    fn sell_of_reference_currency_uses_amount_as_value() {
        let mut t = trade(Action::Sell, "EUR", "USD");
        t.amount = d("5000");
        t.price = d("0.8");
        t.value = d("4000");
        t.quote_price_ref = d("1.25");
        t.quote_fee = fee("USD", "2", "2.5");

        let c = resolver().resolve(&t, "t2".to_string()).unwrap();
        assert_eq!(c.from_asset, Asset::new("EUR"));
        assert_eq!(c.to_asset, Asset::new("USD"));
        assert_eq!(c.from_amount, d("5000"));
        assert_eq!(c.from_amount_ref, d("5000"));
        assert_eq!(c.to_amount, d("4000"));
        assert_eq!(c.to_amount_net, d("3998"));
        assert_eq!(c.to_amount_ref, d("5000"));
        assert_eq!(c.price, d("1.25"));
        assert_eq!(c.price_ref, d("1.25"));
        assert_eq!(c.fee_ref, d("2.5"));
    }

    #[test]
    fn sell_values_base_through_quote_price() {
        let mut t = trade(Action::Sell, "BTC", "USD");
        t.amount = d("1");
        t.price = d("30000");
        t.value = d("30000");
        t.value_ref = d("1");
        t.quote_price_ref = d("0.9");

        let c = resolver().resolve(&t, "t3".to_string()).unwrap();
        assert_eq!(c.from_amount_ref, d("27000"));

        t.quote_price_ref = Decimal::zero();
        let c = resolver().resolve(&t, "t3".to_string()).unwrap();
        assert_eq!(c.from_amount_ref, d("1"));
    }

    #[test]
    fn sell_at_zero_price_does_not_panic() {
        let mut t = trade(Action::Sell, "XYZ", "EUR");
        t.amount = d("3");
        let c = resolver().resolve(&t, "t4".to_string()).unwrap();
        assert_eq!(c.price, Decimal::zero());
    }

    #[test]
    fn unknown_action_is_skipped() {
        let t = trade(Action::Unknown, "BTC", "EUR");
        assert!(resolver().resolve(&t, "t5".to_string()).is_none());
    }

    #[test]
    fn both_fee_legs_are_summed_in_absolute_terms() {
        let mut t = trade(Action::Buy, "BTC", "EUR");
        t.amount = d("1");
        t.value = d("100");
        t.value_ref = d("100");
        t.fee = fee("BTC", "-0.001", "-0.123456");
        t.quote_fee = fee("EUR", "1", "1");

        let c = resolver().resolve(&t, "t6".to_string()).unwrap();
        assert_eq!(c.fee_ref, d("1.1235"));
        assert_eq!(c.to_amount_net, d("0.999"));
        assert_eq!(c.from_amount_net, d("99"));
    }
}
