//! 테스트용 게이트웨이/알림/시계

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::notifier::{Alert, Notifier};
use crate::schedule::Clock;
use exchanges::FuturesGateway;
use interface::{
    ExchangeError, FundingIncome, FundingRecord, MarketOrder, OpenPosition, OrderResponse,
    StopMarketOrder, SymbolTradingRules,
};

#[derive(Default)]
struct MockState {
    rates: HashMap<String, f64>,
    active: Option<Vec<String>>,
    histories: HashMap<String, Vec<FundingRecord>>,
    rules: HashMap<String, SymbolTradingRules>,
    prices: HashMap<String, f64>,
    balance: f64,
    positions: Vec<OpenPosition>,
    income: Vec<FundingIncome>,
    ping_fails: bool,
    rates_fail: bool,
    price_fails: bool,
    positions_fail: bool,
    entry_fails: bool,
    close_fails: bool,
    stop_fails: bool,
    income_fails: bool,
    /// 시장가 주문 체결가 (없으면 현재가)
    fill_price: Option<f64>,
    history_calls: Vec<String>,
    market_orders: Vec<MarketOrder>,
    stop_orders: Vec<StopMarketOrder>,
    cancelled: Vec<String>,
}

pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                balance: 1_000.0,
                ..Default::default()
            }),
        }
    }

    fn with(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    fn edit(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn with_rate(self, symbol: &str, rate: f64) -> Self {
        self.with(|s| {
            s.rates.insert(symbol.to_string(), rate);
        })
    }

    pub fn with_history(self, symbol: &str, history: Vec<FundingRecord>) -> Self {
        self.with(|s| {
            s.histories.insert(symbol.to_string(), history);
        })
    }

    /// 가격/규칙까지 한 번에 세팅된 거래 가능 심볼
    pub fn with_market(self, symbol: &str, price: f64, rules: SymbolTradingRules) -> Self {
        self.with(|s| {
            s.prices.insert(symbol.to_string(), price);
            s.rules.insert(symbol.to_string(), rules);
        })
    }

    pub fn with_balance(self, balance: f64) -> Self {
        self.with(|s| s.balance = balance)
    }

    pub fn set_rate(&self, symbol: &str, rate: f64) {
        self.edit(|s| {
            s.rates.insert(symbol.to_string(), rate);
        })
    }

    pub fn set_active(&self, symbols: &[&str]) {
        self.edit(|s| s.active = Some(symbols.iter().map(|s| s.to_string()).collect()))
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.edit(|s| {
            s.prices.insert(symbol.to_string(), price);
        })
    }

    pub fn set_fill_price(&self, price: Option<f64>) {
        self.edit(|s| s.fill_price = price)
    }

    pub fn set_positions(&self, positions: Vec<OpenPosition>) {
        self.edit(|s| s.positions = positions)
    }

    pub fn set_income(&self, income: Vec<FundingIncome>) {
        self.edit(|s| s.income = income)
    }

    pub fn fail_ping(&self, fail: bool) {
        self.edit(|s| s.ping_fails = fail)
    }

    pub fn fail_rates(&self, fail: bool) {
        self.edit(|s| s.rates_fail = fail)
    }

    pub fn fail_price(&self, fail: bool) {
        self.edit(|s| s.price_fails = fail)
    }

    pub fn fail_positions(&self, fail: bool) {
        self.edit(|s| s.positions_fail = fail)
    }

    pub fn fail_entry(&self, fail: bool) {
        self.edit(|s| s.entry_fails = fail)
    }

    pub fn fail_close(&self, fail: bool) {
        self.edit(|s| s.close_fails = fail)
    }

    pub fn fail_stop(&self, fail: bool) {
        self.edit(|s| s.stop_fails = fail)
    }

    pub fn fail_income(&self, fail: bool) {
        self.edit(|s| s.income_fails = fail)
    }

    pub fn history_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().history_calls.clone()
    }

    pub fn market_orders(&self) -> Vec<MarketOrder> {
        self.state.lock().unwrap().market_orders.clone()
    }

    pub fn stop_orders(&self) -> Vec<StopMarketOrder> {
        self.state.lock().unwrap().stop_orders.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }
}

fn unavailable(what: &str) -> ExchangeError {
    ExchangeError::Other(format!("{what} unavailable"))
}

#[async_trait]
impl FuturesGateway for MockGateway {
    async fn ping(&self) -> Result<(), ExchangeError> {
        if self.state.lock().unwrap().ping_fails {
            return Err(ExchangeError::Other("unreachable".to_string()));
        }
        Ok(())
    }

    async fn active_perpetual_symbols(&self) -> Result<Vec<String>, ExchangeError> {
        let s = self.state.lock().unwrap();
        Ok(match &s.active {
            Some(active) => active.clone(),
            None => s.rates.keys().cloned().collect(),
        })
    }

    async fn funding_rates(&self) -> Result<HashMap<String, f64>, ExchangeError> {
        let s = self.state.lock().unwrap();
        if s.rates_fail {
            return Err(unavailable("premium index"));
        }
        Ok(s.rates.clone())
    }

    async fn funding_history(
        &self,
        symbol: &str,
        _limit: u32,
    ) -> Result<Vec<FundingRecord>, ExchangeError> {
        let mut s = self.state.lock().unwrap();
        s.history_calls.push(symbol.to_string());
        s.histories
            .get(symbol)
            .cloned()
            .ok_or_else(|| unavailable("funding history"))
    }

    async fn trading_rules(&self, symbol: &str) -> Result<SymbolTradingRules, ExchangeError> {
        self.state
            .lock()
            .unwrap()
            .rules
            .get(symbol)
            .copied()
            .ok_or_else(|| unavailable("exchange info"))
    }

    async fn last_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let s = self.state.lock().unwrap();
        if s.price_fails {
            return Err(unavailable("ticker"));
        }
        s.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| unavailable("ticker"))
    }

    async fn balance(&self) -> Result<f64, ExchangeError> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, ExchangeError> {
        let s = self.state.lock().unwrap();
        if s.positions_fail {
            return Err(unavailable("position risk"));
        }
        Ok(s.positions.clone())
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn market_order(&self, order: &MarketOrder) -> Result<OrderResponse, ExchangeError> {
        let mut s = self.state.lock().unwrap();
        if (order.reduce_only && s.close_fails) || (!order.reduce_only && s.entry_fails) {
            return Err(ExchangeError::Api {
                status: 400,
                body: "{\"code\":-2019,\"msg\":\"Margin is insufficient.\"}".to_string(),
            });
        }
        s.market_orders.push(order.clone());
        let price = s
            .fill_price
            .or_else(|| s.prices.get(&order.symbol).copied())
            .unwrap_or(0.0);
        Ok(OrderResponse {
            symbol: order.symbol.clone(),
            order_id: Some(s.market_orders.len() as u64),
            client_order_id: None,
            executed_qty: Some(order.quantity.to_string()),
            avg_price: Some(price.to_string()),
            status: Some("FILLED".to_string()),
        })
    }

    async fn stop_market_order(
        &self,
        order: &StopMarketOrder,
    ) -> Result<OrderResponse, ExchangeError> {
        let mut s = self.state.lock().unwrap();
        if s.stop_fails {
            return Err(ExchangeError::api(400, "{\"code\":-2021,\"msg\":\"Order would immediately trigger.\"}"));
        }
        s.stop_orders.push(order.clone());
        Ok(OrderResponse {
            symbol: order.symbol.clone(),
            status: Some("NEW".to_string()),
            ..Default::default()
        })
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        self.state.lock().unwrap().cancelled.push(symbol.to_string());
        Ok(())
    }

    async fn funding_income(&self, _limit: u32) -> Result<Vec<FundingIncome>, ExchangeError> {
        let s = self.state.lock().unwrap();
        if s.income_fails {
            return Err(unavailable("income"));
        }
        Ok(s.income.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn rules(min_qty: f64, quantity_precision: u32) -> SymbolTradingRules {
    SymbolTradingRules {
        min_qty,
        step_size: 10f64.powi(-(quantity_precision as i32)),
        quantity_precision,
        price_precision: 3,
    }
}
