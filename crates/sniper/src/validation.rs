//! 주문 직전 진입 검증. 6개 게이트를 순서대로 돌리고 처음 실패한 곳에서 멈춘다.

use std::fmt;

use chrono::Duration as ChronoDuration;
use tracing::debug;

use crate::config::Config;
use crate::lifecycle::PositionManager;
use crate::schedule::Clock;
use exchanges::FuturesGateway;
use interface::SymbolTradingRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Connectivity,
    Price,
    Quantity,
    Position,
    Balance,
    Cooldown,
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Gate::Connectivity => "connectivity",
            Gate::Price => "price",
            Gate::Quantity => "quantity",
            Gate::Position => "position",
            Gate::Balance => "balance",
            Gate::Cooldown => "cooldown",
        };
        f.write_str(s)
    }
}

/// 진입 취소 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    ConnectivityLost,
    InvalidPrice,
    QuantityBelowMinimum,
    PositionAlreadyExists,
    BalanceBelowFloor,
    SymbolInCooldown,
    /// 게이트에 필요한 데이터를 받지 못함
    DataUnavailable(Gate),
    /// 게이트가 허용 시간 안에 끝나지 않음
    ValidationExpired,
    /// 새로 받은 펀딩비로 다시 골랐더니 후보가 사라짐
    NoLongerEligible,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::ConnectivityLost => f.write_str("connectivity lost"),
            CancelReason::InvalidPrice => f.write_str("invalid price"),
            CancelReason::QuantityBelowMinimum => f.write_str("quantity below minimum"),
            CancelReason::PositionAlreadyExists => f.write_str("position already exists"),
            CancelReason::BalanceBelowFloor => f.write_str("balance below floor"),
            CancelReason::SymbolInCooldown => f.write_str("symbol in cooldown"),
            CancelReason::DataUnavailable(gate) => write!(f, "{} data unavailable", gate),
            CancelReason::ValidationExpired => f.write_str("validation expired"),
            CancelReason::NoLongerEligible => f.write_str("no longer eligible"),
        }
    }
}

/// 모든 게이트를 통과한 진입
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedEntry {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub rules: SymbolTradingRules,
}

pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// round(capital / price, precision)
pub fn size_quantity(capital: f64, price: f64, precision: u32) -> f64 {
    round_to(capital / price, precision)
}

pub async fn validate_entry(
    gateway: &dyn FuturesGateway,
    positions: &PositionManager,
    config: &Config,
    symbol: &str,
    clock: &dyn Clock,
) -> Result<ApprovedEntry, CancelReason> {
    let started = clock.now();

    // 1. connectivity
    gateway
        .ping()
        .await
        .map_err(|_| CancelReason::ConnectivityLost)?;

    // 2. price
    let price = gateway
        .last_price(symbol)
        .await
        .map_err(|_| CancelReason::DataUnavailable(Gate::Price))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(CancelReason::InvalidPrice);
    }

    // 3. quantity
    let rules = gateway
        .trading_rules(symbol)
        .await
        .map_err(|_| CancelReason::DataUnavailable(Gate::Quantity))?;
    let quantity = size_quantity(config.capital, price, rules.quantity_precision);
    if quantity <= 0.0 || quantity < rules.min_qty {
        debug!("{} quantity {} < min {}", symbol, quantity, rules.min_qty);
        return Err(CancelReason::QuantityBelowMinimum);
    }

    // 4. position (내부 슬롯 + 거래소)
    if positions.has_position() {
        return Err(CancelReason::PositionAlreadyExists);
    }
    let open = gateway
        .open_positions()
        .await
        .map_err(|_| CancelReason::DataUnavailable(Gate::Position))?;
    if !open.is_empty() {
        debug!("exchange reports open positions: {:?}", open);
        return Err(CancelReason::PositionAlreadyExists);
    }

    // 5. balance
    let balance = gateway
        .balance()
        .await
        .map_err(|_| CancelReason::DataUnavailable(Gate::Balance))?;
    if balance < config.minimum_balance {
        return Err(CancelReason::BalanceBelowFloor);
    }

    // 6. cooldown
    let now = clock.now();
    if positions.in_cooldown(symbol, now) {
        return Err(CancelReason::SymbolInCooldown);
    }

    let window = ChronoDuration::from_std(config.validation_window)
        .unwrap_or_else(|_| ChronoDuration::seconds(2));
    if now - started > window {
        return Err(CancelReason::ValidationExpired);
    }

    Ok(ApprovedEntry {
        symbol: symbol.to_string(),
        price,
        quantity,
        rules,
    })
}
