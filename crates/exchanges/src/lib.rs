use std::collections::HashMap;

use async_trait::async_trait;

use interface::{
    ExchangeError, FundingIncome, FundingRecord, MarketOrder, OpenPosition, OrderResponse,
    StopMarketOrder, SymbolTradingRules,
};

pub mod binance;

/// 무기한 선물 거래소 게이트웨이.
/// 시세 조회, 계정 조회, 주문 제출을 모두 담당하고 전략 쪽은 이 트레이트에만 의존한다.
#[async_trait]
pub trait FuturesGateway: Send + Sync {
    /// 거래소 연결 확인
    async fn ping(&self) -> Result<(), ExchangeError>;

    /// 거래 가능한 무기한(PERPETUAL) 심볼 목록
    async fn active_perpetual_symbols(&self) -> Result<Vec<String>, ExchangeError>;

    /// 심볼 -> 현재 정산 주기의 예상 펀딩비
    async fn funding_rates(&self) -> Result<HashMap<String, f64>, ExchangeError>;

    /// 최근 정산 기록 (오래된 것부터)
    async fn funding_history(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<FundingRecord>, ExchangeError>;

    async fn trading_rules(&self, symbol: &str) -> Result<SymbolTradingRules, ExchangeError>;

    async fn last_price(&self, symbol: &str) -> Result<f64, ExchangeError>;

    /// 선물 지갑 USDT 잔고
    async fn balance(&self) -> Result<f64, ExchangeError>;

    /// 수량이 0이 아닌 포지션만
    async fn open_positions(&self) -> Result<Vec<OpenPosition>, ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;

    async fn market_order(&self, order: &MarketOrder) -> Result<OrderResponse, ExchangeError>;

    async fn stop_market_order(
        &self,
        order: &StopMarketOrder,
    ) -> Result<OrderResponse, ExchangeError>;

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError>;

    /// 최근 펀딩비 수입 기록
    async fn funding_income(&self, limit: u32) -> Result<Vec<FundingIncome>, ExchangeError>;
}

// Convenience re-exports
pub use binance::BinanceClient;
