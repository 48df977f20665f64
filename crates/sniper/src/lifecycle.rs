//! 단일 포지션 상태 머신과 청산 후 쿨다운.
//!
//! `Idle → Entering → Open → Closing → Idle` 순서로만 움직이며,
//! 포지션 슬롯은 `PositionManager` 하나가 소유한다.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::EngineError;
use crate::ledger::TradeResult;
use crate::schedule::next_funding_time;
use crate::selector::EligibleCandidate;
use crate::validation::{round_to, ApprovedEntry};
use exchanges::FuturesGateway;
use interface::{ExchangeError, FundingInterval, MarketOrder, OrderSide, StopMarketOrder};

#[derive(Debug, Clone, PartialEq)]
pub struct PositionEntry {
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub quantity_precision: u32,
    pub entry_notional: f64,
    pub entry_timestamp: DateTime<Utc>,
    /// 정산 시각 - exit_lead
    pub planned_exit_timestamp: DateTime<Utc>,
    pub settlement_time: DateTime<Utc>,
    /// 진입 시점의 정산 주기. 보유 중 재확인에 실패하면 이 값을 쓴다.
    pub interval: FundingInterval,
    pub rate: f64,
    /// 손절 주문이 걸려 있는지
    pub protected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleState {
    Idle,
    Entering { symbol: String },
    Open(PositionEntry),
    Closing(PositionEntry),
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => f.write_str("idle"),
            LifecycleState::Entering { symbol } => write!(f, "entering {}", symbol),
            LifecycleState::Open(p) => write!(f, "open {}", p.symbol),
            LifecycleState::Closing(p) => write!(f, "closing {}", p.symbol),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("cannot {action} while {state}")]
pub struct TransitionError {
    pub action: &'static str,
    pub state: String,
}

/// 심볼별 마지막 청산 시각
#[derive(Debug, Clone)]
pub struct CooldownTable {
    duration: ChronoDuration,
    exits: HashMap<String, DateTime<Utc>>,
}

impl CooldownTable {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration: ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::minutes(5)),
            exits: HashMap::new(),
        }
    }

    pub fn record(&mut self, symbol: &str, exit_timestamp: DateTime<Utc>) {
        self.exits.insert(symbol.to_string(), exit_timestamp);
    }

    /// 청산 후 경과 시간이 쿨다운보다 짧으면 true
    pub fn is_active(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        self.exits
            .get(symbol)
            .map(|exit| now - *exit < self.duration)
            .unwrap_or(false)
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        let duration = self.duration;
        self.exits.retain(|_, exit| now - *exit < duration);
    }
}

/// 주문 결과
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Opened(PositionEntry),
    /// dry-run: 주문 없이 검증만 통과
    Simulated { symbol: String, price: f64, quantity: f64 },
}

pub struct PositionManager {
    state: LifecycleState,
    cooldowns: CooldownTable,
}

impl PositionManager {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: LifecycleState::Idle,
            cooldowns: CooldownTable::new(cooldown),
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn has_position(&self) -> bool {
        !matches!(self.state, LifecycleState::Idle)
    }

    pub fn open_position(&self) -> Option<&PositionEntry> {
        match &self.state {
            LifecycleState::Open(p) => Some(p),
            _ => None,
        }
    }

    pub fn in_cooldown(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        self.cooldowns.is_active(symbol, now)
    }

    pub fn prune_cooldowns(&mut self, now: DateTime<Utc>) {
        self.cooldowns.prune(now);
    }

    pub fn begin_entry(&mut self, symbol: &str) -> Result<(), TransitionError> {
        match self.state {
            LifecycleState::Idle => {
                self.state = LifecycleState::Entering {
                    symbol: symbol.to_string(),
                };
                Ok(())
            }
            _ => Err(self.illegal("enter")),
        }
    }

    pub fn confirm_fill(&mut self, entry: PositionEntry) -> Result<(), TransitionError> {
        match &self.state {
            LifecycleState::Entering { symbol } if *symbol == entry.symbol => {
                self.state = LifecycleState::Open(entry);
                Ok(())
            }
            _ => Err(self.illegal("confirm fill")),
        }
    }

    /// 진입 주문이 나가지 않았거나 체결되지 않음
    pub fn abort_entry(&mut self) {
        if let LifecycleState::Entering { .. } = self.state {
            self.state = LifecycleState::Idle;
        }
    }

    pub fn begin_close(&mut self) -> Result<PositionEntry, TransitionError> {
        match std::mem::replace(&mut self.state, LifecycleState::Idle) {
            LifecycleState::Open(p) => {
                self.state = LifecycleState::Closing(p.clone());
                Ok(p)
            }
            other => {
                self.state = other;
                Err(self.illegal("close"))
            }
        }
    }

    /// 청산 완료: 슬롯을 비우고 쿨다운 기록
    pub fn confirm_close(&mut self, exit_timestamp: DateTime<Utc>) -> Result<PositionEntry, TransitionError> {
        match std::mem::replace(&mut self.state, LifecycleState::Idle) {
            LifecycleState::Closing(p) => {
                self.cooldowns.record(&p.symbol, exit_timestamp);
                Ok(p)
            }
            other => {
                self.state = other;
                Err(self.illegal("confirm close"))
            }
        }
    }

    /// 청산 실패: 포지션은 그대로 Open
    pub fn abort_close(&mut self) {
        if let LifecycleState::Closing(p) = &self.state {
            self.state = LifecycleState::Open(p.clone());
        }
    }

    fn illegal(&self, action: &'static str) -> TransitionError {
        TransitionError {
            action,
            state: self.state.to_string(),
        }
    }

    /// 검증을 통과한 진입을 실행한다. 레버리지 설정, 시장가 매수, 체결 확인, 손절 주문 순.
    pub async fn enter(
        &mut self,
        gateway: &dyn FuturesGateway,
        config: &Config,
        approved: &ApprovedEntry,
        candidate: &EligibleCandidate,
        now: DateTime<Utc>,
    ) -> Result<EntryOutcome, EngineError> {
        let symbol = approved.symbol.as_str();
        self.begin_entry(symbol)
            .map_err(|e| EngineError::Critical(e.to_string()))?;

        if config.dry_run {
            info!(
                "[dry-run] would buy {} {} @ {}",
                approved.quantity, symbol, approved.price
            );
            self.abort_entry();
            return Ok(EntryOutcome::Simulated {
                symbol: symbol.to_string(),
                price: approved.price,
                quantity: approved.quantity,
            });
        }

        if let Err(e) = gateway.set_leverage(symbol, config.leverage).await {
            warn!("set leverage {}x for {} failed: {}", config.leverage, symbol, e);
        }

        let position_side = config.hedge_mode.then(|| "LONG".to_string());
        let order = MarketOrder {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity: approved.quantity,
            quantity_precision: approved.rules.quantity_precision,
            reduce_only: false,
            position_side: position_side.clone(),
        };

        let response = match gateway.market_order(&order).await {
            Ok(response) => response,
            Err(e) => {
                self.abort_entry();
                return Err(EngineError::order(symbol, e));
            }
        };
        if !response.is_filled() {
            self.abort_entry();
            return Err(EngineError::order(
                symbol,
                ExchangeError::Other(format!(
                    "entry not filled (status {})",
                    response.status.as_deref().unwrap_or("unknown")
                )),
            ));
        }

        let entry_price = match response.avg_price() {
            p if p > 0.0 => p,
            _ => approved.price,
        };
        let quantity = response.executed_qty();
        let settlement_time = next_funding_time(now, candidate.interval);
        let exit_lead = ChronoDuration::from_std(config.exit_lead).unwrap_or_else(|_| ChronoDuration::seconds(60));

        let stop_price = round_to(
            entry_price * (1.0 - config.stop_loss_pct),
            approved.rules.price_precision,
        );
        let stop = StopMarketOrder {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            stop_price,
            price_precision: approved.rules.price_precision,
            position_side,
        };
        let protected = match gateway.stop_market_order(&stop).await {
            Ok(_) => {
                info!("stop-loss set for {} @ {}", symbol, stop_price);
                true
            }
            Err(e) => {
                // 진입은 이미 체결됨. 되돌리지 않는다.
                warn!("stop-loss for {} failed, position unprotected: {}", symbol, e);
                false
            }
        };

        let entry = PositionEntry {
            symbol: symbol.to_string(),
            entry_price,
            quantity,
            quantity_precision: approved.rules.quantity_precision,
            entry_notional: entry_price * quantity,
            entry_timestamp: now,
            planned_exit_timestamp: settlement_time - exit_lead,
            settlement_time,
            interval: candidate.interval,
            rate: candidate.rate,
            protected,
        };
        self.confirm_fill(entry.clone())
            .map_err(|e| EngineError::Critical(e.to_string()))?;

        info!(
            "opened {} qty {} @ {} (settlement {}, exit at {})",
            entry.symbol, entry.quantity, entry.entry_price, entry.settlement_time, entry.planned_exit_timestamp
        );
        Ok(EntryOutcome::Opened(entry))
    }

    /// 보유 중인 포지션 전량 청산. 실패하면 포지션은 Open으로 남는다.
    pub async fn close(
        &mut self,
        gateway: &dyn FuturesGateway,
        config: &Config,
        now: DateTime<Utc>,
    ) -> Result<TradeResult, EngineError> {
        let entry = self
            .begin_close()
            .map_err(|e| EngineError::Critical(e.to_string()))?;
        let symbol = entry.symbol.as_str();

        // 가격을 못 받아도 청산 주문은 낸다
        let price = match gateway.last_price(symbol).await {
            Ok(price) if price > 0.0 => Some(price),
            Ok(_) => None,
            Err(e) => {
                warn!("last price for {} unavailable before close: {}", symbol, e);
                None
            }
        };

        let order = MarketOrder {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            quantity: entry.quantity,
            quantity_precision: entry.quantity_precision,
            reduce_only: true,
            position_side: config.hedge_mode.then(|| "LONG".to_string()),
        };
        let response = match gateway.market_order(&order).await {
            Ok(response) if response.is_filled() => response,
            Ok(response) => {
                self.abort_close();
                return Err(EngineError::order(
                    symbol,
                    ExchangeError::Other(format!(
                        "close not filled (status {})",
                        response.status.as_deref().unwrap_or("unknown")
                    )),
                ));
            }
            Err(e) => {
                self.abort_close();
                return Err(EngineError::order(symbol, e));
            }
        };

        // 체결 평균가 → 직전 현재가 → 진입가
        let exit_price = match response.avg_price() {
            p if p > 0.0 => p,
            _ => price.unwrap_or(entry.entry_price),
        };
        let trade = TradeResult::from_close(&entry, exit_price, now);
        self.confirm_close(now)
            .map_err(|e| EngineError::Critical(e.to_string()))?;

        // 남아있는 손절 주문 정리
        if let Err(e) = gateway.cancel_all_orders(symbol).await {
            warn!("cancel open orders for {} failed: {}", symbol, e);
        }

        info!(
            "closed {} @ {}: pnl {:.4} USDT ({:.2}%)",
            symbol, exit_price, trade.realized_pnl, trade.pnl_percent
        );
        Ok(trade)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::testing::{rules, MockGateway};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 29, 7, 14, 0).unwrap()
    }

    fn approved(symbol: &str, price: f64, quantity: f64) -> ApprovedEntry {
        ApprovedEntry {
            symbol: symbol.to_string(),
            price,
            quantity,
            rules: rules(0.001, 3),
        }
    }

    fn candidate(symbol: &str) -> EligibleCandidate {
        EligibleCandidate {
            symbol: symbol.to_string(),
            rate: -0.005,
            interval: FundingInterval::EightHours,
            seconds_to_funding: 2760.0,
        }
    }

    #[test]
    fn cooldown_expires_exactly_at_duration() {
        let mut table = CooldownTable::new(Duration::from_secs(300));
        table.record("ABCUSDT", t0());

        assert!(table.is_active("ABCUSDT", t0()));
        assert!(table.is_active("ABCUSDT", t0() + ChronoDuration::seconds(299)));
        assert!(!table.is_active("ABCUSDT", t0() + ChronoDuration::seconds(300)));
        assert!(!table.is_active("OTHERUSDT", t0()));

        table.prune(t0() + ChronoDuration::seconds(300));
        assert!(table.exits.is_empty());
    }

    #[test]
    fn only_one_position_at_a_time() {
        let mut manager = PositionManager::new(Duration::from_secs(300));
        manager.begin_entry("AUSDT").unwrap();
        assert!(manager.has_position());
        assert!(manager.begin_entry("BUSDT").is_err());

        manager.abort_entry();
        assert_eq!(manager.state(), &LifecycleState::Idle);
        assert!(manager.begin_close().is_err());
    }

    #[tokio::test]
    async fn enter_places_buy_and_stop() {
        let gateway = MockGateway::new().with_market("ABCUSDT", 37.777, rules(0.01, 3));
        gateway.set_fill_price(Some(37.8));
        let mut manager = PositionManager::new(Duration::from_secs(300));
        let config = Config::default();

        let outcome = manager
            .enter(&gateway, &config, &approved("ABCUSDT", 37.777, 2.647), &candidate("ABCUSDT"), t0())
            .await
            .unwrap();

        let entry = match outcome {
            EntryOutcome::Opened(entry) => entry,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(entry.entry_price, 37.8);
        assert_eq!(entry.quantity, 2.647);
        assert!(entry.protected);
        assert_eq!(entry.settlement_time, Utc.with_ymd_and_hms(2025, 11, 29, 8, 0, 0).unwrap());
        assert_eq!(entry.planned_exit_timestamp, Utc.with_ymd_and_hms(2025, 11, 29, 7, 59, 0).unwrap());

        let orders = gateway.market_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert!(!orders[0].reduce_only);

        let stops = gateway.stop_orders();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].stop_price, 34.02);
        assert!(matches!(manager.state(), LifecycleState::Open(_)));
    }

    #[tokio::test]
    async fn stop_failure_leaves_position_open_and_unprotected() {
        let gateway = MockGateway::new().with_market("ABCUSDT", 10.0, rules(0.01, 3));
        gateway.fail_stop(true);
        let mut manager = PositionManager::new(Duration::from_secs(300));

        let outcome = manager
            .enter(&gateway, &Config::default(), &approved("ABCUSDT", 10.0, 10.0), &candidate("ABCUSDT"), t0())
            .await
            .unwrap();

        match outcome {
            EntryOutcome::Opened(entry) => assert!(!entry.protected),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(manager.open_position().is_some());
    }

    #[tokio::test]
    async fn rejected_entry_returns_to_idle() {
        let gateway = MockGateway::new().with_market("ABCUSDT", 10.0, rules(0.01, 3));
        gateway.fail_entry(true);
        let mut manager = PositionManager::new(Duration::from_secs(300));

        let err = manager
            .enter(&gateway, &Config::default(), &approved("ABCUSDT", 10.0, 10.0), &candidate("ABCUSDT"), t0())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::OrderPlacement);
        assert_eq!(manager.state(), &LifecycleState::Idle);
        assert!(gateway.stop_orders().is_empty());
    }

    #[tokio::test]
    async fn dry_run_sends_nothing() {
        let gateway = MockGateway::new().with_market("ABCUSDT", 10.0, rules(0.01, 3));
        let mut manager = PositionManager::new(Duration::from_secs(300));
        let config = Config {
            dry_run: true,
            ..Config::default()
        };

        let outcome = manager
            .enter(&gateway, &config, &approved("ABCUSDT", 10.0, 10.0), &candidate("ABCUSDT"), t0())
            .await
            .unwrap();

        assert!(matches!(outcome, EntryOutcome::Simulated { .. }));
        assert!(gateway.market_orders().is_empty());
        assert!(!manager.has_position());
    }

    #[tokio::test]
    async fn close_records_cooldown_and_cancels_stop() {
        let gateway = MockGateway::new().with_market("ABCUSDT", 10.0, rules(0.01, 3));
        let mut manager = PositionManager::new(Duration::from_secs(300));
        let config = Config::default();
        manager
            .enter(&gateway, &config, &approved("ABCUSDT", 10.0, 10.0), &candidate("ABCUSDT"), t0())
            .await
            .unwrap();

        gateway.set_price("ABCUSDT", 10.5);
        let exit_at = Utc.with_ymd_and_hms(2025, 11, 29, 7, 59, 0).unwrap();
        let trade = manager.close(&gateway, &config, exit_at).await.unwrap();

        assert_eq!(trade.exit_price, 10.5);
        assert!((trade.realized_pnl - 5.0).abs() < 1e-9);
        assert_eq!(manager.state(), &LifecycleState::Idle);
        assert!(manager.in_cooldown("ABCUSDT", exit_at + ChronoDuration::seconds(299)));
        assert!(!manager.in_cooldown("ABCUSDT", exit_at + ChronoDuration::seconds(300)));
        assert_eq!(gateway.cancelled(), vec!["ABCUSDT".to_string()]);

        let orders = gateway.market_orders();
        assert!(orders[1].reduce_only);
        assert_eq!(orders[1].side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn failed_close_keeps_position_open() {
        let gateway = MockGateway::new().with_market("ABCUSDT", 10.0, rules(0.01, 3));
        let mut manager = PositionManager::new(Duration::from_secs(300));
        let config = Config::default();
        manager
            .enter(&gateway, &config, &approved("ABCUSDT", 10.0, 10.0), &candidate("ABCUSDT"), t0())
            .await
            .unwrap();

        gateway.fail_close(true);
        assert!(manager.close(&gateway, &config, t0()).await.is_err());
        assert!(manager.open_position().is_some());
        assert!(!manager.in_cooldown("ABCUSDT", t0()));
    }

    #[tokio::test]
    async fn close_proceeds_without_last_price() {
        let gateway = MockGateway::new().with_market("ABCUSDT", 10.0, rules(0.01, 3));
        let mut manager = PositionManager::new(Duration::from_secs(300));
        let config = Config::default();
        manager
            .enter(&gateway, &config, &approved("ABCUSDT", 10.0, 10.0), &candidate("ABCUSDT"), t0())
            .await
            .unwrap();

        gateway.fail_price(true);
        gateway.set_fill_price(Some(10.5));
        let trade = manager.close(&gateway, &config, t0()).await.unwrap();

        assert_eq!(trade.exit_price, 10.5);
        assert_eq!(manager.state(), &LifecycleState::Idle);
        assert!(gateway.market_orders()[1].reduce_only);
    }

    #[tokio::test]
    async fn exit_price_falls_back_to_entry_price() {
        let gateway = MockGateway::new().with_market("ABCUSDT", 10.0, rules(0.01, 3));
        let mut manager = PositionManager::new(Duration::from_secs(300));
        let config = Config::default();
        manager
            .enter(&gateway, &config, &approved("ABCUSDT", 10.0, 10.0), &candidate("ABCUSDT"), t0())
            .await
            .unwrap();

        // 체결 평균가도 현재가도 없음
        gateway.fail_price(true);
        gateway.set_fill_price(Some(0.0));
        let trade = manager.close(&gateway, &config, t0()).await.unwrap();

        assert_eq!(trade.exit_price, 10.0);
        assert_eq!(trade.realized_pnl, 0.0);
        assert!(manager.in_cooldown("ABCUSDT", t0()));
    }
}
