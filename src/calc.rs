use crate::types::{Instrument, PositionSide, Side, Strategy};

/// Rounds a number to the specified number of decimal places.
fn round_to_decimal_places(value: f64, decimal_places: usize) -> f64 {
    let multiplier = 10f64.powi(decimal_places as i32);
    (value * multiplier).round() / multiplier
}

/// Rounds a number up to the nearest multiple of `step`.
pub fn round_up(n: f64, step: f64) -> f64 {
    let result = (n / step).ceil() * step;
    round_to_decimal_places(result, 10)
}

/// Rounds a number to the nearest multiple of `step`.
///
/// Used for snapping stop prices and trailing distances to the tick size.
pub fn round_(n: f64, step: f64) -> f64 {
    let result = (n / step).round() * step;
    round_to_decimal_places(result, 10)
}

/// Rounds a number down to the nearest multiple of `step`.
///
/// Used for order quantities so an order never exceeds the budget it was sized from.
pub fn round_dn(n: f64, step: f64) -> f64 {
    // Nudge before flooring so 0.3 / 0.1 = 2.9999999999999996 still lands on 3 steps.
    let result = (n / step + 1e-9).floor() * step;
    round_to_decimal_places(result, 10)
}

pub fn calculate_percentage(target: f64, percent: f64) -> f64 {
    target * (percent / 100.0)
}

/// Unrealized PnL of a position at `current_price`.
pub fn calculate_pnl(entry_price: f64, current_price: f64, size: f64, side: PositionSide) -> f64 {
    match side {
        PositionSide::Long => (current_price - entry_price) * size,
        PositionSide::Short => (entry_price - current_price) * size,
    }
}

/// Price at which a position reaches `target_pnl` (quote currency).
pub fn calculate_price_for_target_pnl(
    entry_price: f64,
    size: f64,
    side: PositionSide,
    target_pnl: f64,
) -> f64 {
    match side {
        PositionSide::Long => entry_price + target_pnl / size,
        PositionSide::Short => entry_price - target_pnl / size,
    }
}

/// PnL as a percentage of the margin posted at `leverage`.
///
/// # Arguments
///
/// * `size` - Position size in contracts.
/// * `avg_price` - Average entry price.
/// * `mark_price` - Current mark price.
/// * `leverage` - Position leverage.
/// * `side` - Position direction.
///
/// # Returns
///
/// Leveraged PnL in percent; zero for an empty position.
pub fn calculate_pnl_percentage(
    size: f64,
    avg_price: f64,
    mark_price: f64,
    leverage: f64,
    side: PositionSide,
) -> f64 {
    let notional = avg_price * size;
    if notional == 0.0 {
        return 0.0;
    }
    let pnl = calculate_pnl(avg_price, mark_price, size, side);
    pnl * leverage / notional * 100.0
}

/// Mark price at which a leveraged position shows `pnl_pct` percent PnL.
///
/// A negative `pnl_pct` gives the loss side, which is how stop-loss prices are derived.
pub fn calculate_markup_price(
    avg_price: f64,
    leverage: f64,
    side: PositionSide,
    pnl_pct: f64,
) -> f64 {
    let offset = pnl_pct * avg_price / (100.0 * leverage);
    match side {
        PositionSide::Long => avg_price + offset,
        PositionSide::Short => avg_price - offset,
    }
}

pub fn tp_by_percent(price: f64, percent: f64, side: PositionSide) -> f64 {
    match side {
        PositionSide::Long => price + calculate_percentage(price, percent),
        PositionSide::Short => price - calculate_percentage(price, percent),
    }
}

pub fn sl_by_percent(price: f64, percent: f64, side: PositionSide) -> f64 {
    match side {
        PositionSide::Long => price - calculate_percentage(price, percent),
        PositionSide::Short => price + calculate_percentage(price, percent),
    }
}

pub fn nearest_lower_multiple_of_ten(n: f64) -> f64 {
    (n / 10.0).floor() * 10.0
}

/// Contracts affordable with `balance` at `leverage`, in whole tens.
pub fn get_amount(balance: f64, price: f64, leverage: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    nearest_lower_multiple_of_ten(balance / price * leverage)
}

/// Order quantity for `margin` at `leverage`.
///
/// Rounds down to the instrument's quantity step when the instrument is known,
/// otherwise falls back to whole tens. Returns `None` when the result is below
/// the instrument's minimum (or zero).
pub fn qty_for_instrument(
    margin: f64,
    price: f64,
    leverage: f64,
    instrument: Option<&Instrument>,
) -> Option<f64> {
    if price <= 0.0 || margin <= 0.0 {
        return None;
    }
    let qty = match instrument {
        Some(inst) if inst.qty_step > 0.0 => {
            let qty = round_dn(margin / price * leverage, inst.qty_step);
            if qty < inst.min_order_qty {
                return None;
            }
            qty
        }
        _ => get_amount(margin, price, leverage),
    };
    if qty > 0.0 {
        Some(qty)
    } else {
        None
    }
}

/// Order side for a move of `changes` percent.
pub fn get_side(changes: f64, strategy: Strategy) -> Side {
    match strategy {
        Strategy::Inertia => {
            if changes > 0.0 {
                Side::Buy
            } else {
                Side::Sell
            }
        }
        Strategy::Reverse => {
            if changes < 0.0 {
                Side::Buy
            } else {
                Side::Sell
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn instrument(qty_step: f64, min_order_qty: f64) -> Instrument {
        Instrument {
            symbol: "ETHUSDT".into(),
            contract_type: "LinearPerpetual".into(),
            status: "Trading".into(),
            quote_coin: "USDT".into(),
            qty_step,
            min_order_qty,
            tick_size: 0.01,
            max_leverage: 100.0,
        }
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_(1.2345, 0.01), 1.23);
        assert_eq!(round_(1.23, 0.05), 1.25);
        assert_eq!(round_up(1.2345, 0.01), 1.24);
        assert_eq!(round_up(1.20, 0.05), 1.20);
        assert_eq!(round_dn(1.2399, 0.01), 1.23);
        assert_eq!(round_dn(0.3, 0.1), 0.3);
    }

    #[test]
    fn test_calculate_pnl() {
        assert!((calculate_pnl(100.0, 110.0, 2.0, PositionSide::Long) - 20.0).abs() < EPSILON);
        assert!((calculate_pnl(100.0, 110.0, 2.0, PositionSide::Short) + 20.0).abs() < EPSILON);
    }

    #[test]
    fn test_price_for_target_pnl() {
        let long = calculate_price_for_target_pnl(100.0, 2.0, PositionSide::Long, 20.0);
        assert!((long - 110.0).abs() < EPSILON);
        let short = calculate_price_for_target_pnl(100.0, 2.0, PositionSide::Short, 20.0);
        assert!((short - 90.0).abs() < EPSILON);
    }

    #[test]
    fn test_pnl_percentage_is_leveraged() {
        // 1% move at 10x is 10% on margin.
        let pct = calculate_pnl_percentage(3.0, 100.0, 101.0, 10.0, PositionSide::Long);
        assert!((pct - 10.0).abs() < EPSILON);
        let pct = calculate_pnl_percentage(3.0, 100.0, 101.0, 10.0, PositionSide::Short);
        assert!((pct + 10.0).abs() < EPSILON);
        assert_eq!(calculate_pnl_percentage(0.0, 100.0, 101.0, 10.0, PositionSide::Long), 0.0);
    }

    #[test]
    fn test_markup_price_inverts_pnl_percentage() {
        let price = calculate_markup_price(200.0, 20.0, PositionSide::Short, 40.0);
        assert!((price - 196.0).abs() < EPSILON);
        let pct = calculate_pnl_percentage(1.0, 200.0, price, 20.0, PositionSide::Short);
        assert!((pct - 40.0).abs() < EPSILON);
        let stop = calculate_markup_price(200.0, 20.0, PositionSide::Long, -10.0);
        assert!((stop - 199.0).abs() < EPSILON);
    }

    #[test]
    fn test_tp_sl_by_percent() {
        assert!((tp_by_percent(100.0, 5.0, PositionSide::Long) - 105.0).abs() < EPSILON);
        assert!((tp_by_percent(100.0, 5.0, PositionSide::Short) - 95.0).abs() < EPSILON);
        assert!((sl_by_percent(100.0, 2.0, PositionSide::Long) - 98.0).abs() < EPSILON);
        assert!((sl_by_percent(100.0, 2.0, PositionSide::Short) - 102.0).abs() < EPSILON);
    }

    #[test]
    fn test_get_amount_floors_to_tens() {
        assert_eq!(nearest_lower_multiple_of_ten(129.9), 120.0);
        assert_eq!(get_amount(100.0, 0.5, 10.0), 2000.0);
        assert_eq!(get_amount(100.0, 3.0, 10.0), 330.0);
        assert_eq!(get_amount(100.0, 0.0, 10.0), 0.0);
    }

    #[test]
    fn test_qty_for_instrument() {
        let eth = instrument(0.01, 0.01);
        // 50 USDT margin at 10x on a 2500 price is 0.2 contracts.
        assert_eq!(qty_for_instrument(50.0, 2500.0, 10.0, Some(&eth)), Some(0.2));
        let coarse = instrument(1.0, 5.0);
        assert_eq!(qty_for_instrument(1.0, 2.0, 5.0, Some(&coarse)), None);
        assert_eq!(qty_for_instrument(100.0, 3.0, 10.0, None), Some(330.0));
        assert_eq!(qty_for_instrument(0.5, 3.0, 10.0, None), None);
    }

    #[test]
    fn test_get_side() {
        assert_eq!(get_side(1.5, Strategy::Inertia), Side::Buy);
        assert_eq!(get_side(-1.5, Strategy::Inertia), Side::Sell);
        assert_eq!(get_side(1.5, Strategy::Reverse), Side::Sell);
        assert_eq!(get_side(-1.5, Strategy::Reverse), Side::Buy);
    }
}
