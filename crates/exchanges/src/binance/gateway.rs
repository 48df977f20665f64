use std::collections::HashMap;

use async_trait::async_trait;

use super::BinanceClient;
use crate::FuturesGateway;
use interface::{
    ExchangeError, FundingIncome, FundingRecord, MarketOrder, OpenPosition, OrderResponse,
    StopMarketOrder, SymbolTradingRules,
};

#[async_trait]
impl FuturesGateway for BinanceClient {
    async fn ping(&self) -> Result<(), ExchangeError> {
        self.server_ping().await
    }

    async fn active_perpetual_symbols(&self) -> Result<Vec<String>, ExchangeError> {
        self.fetch_perpetual_symbols().await
    }

    async fn funding_rates(&self) -> Result<HashMap<String, f64>, ExchangeError> {
        self.fetch_funding_rates().await
    }

    async fn funding_history(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<FundingRecord>, ExchangeError> {
        self.fetch_funding_history(symbol, limit).await
    }

    async fn trading_rules(&self, symbol: &str) -> Result<SymbolTradingRules, ExchangeError> {
        self.fetch_trading_rules(symbol).await
    }

    async fn last_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.fetch_last_price(symbol).await
    }

    async fn balance(&self) -> Result<f64, ExchangeError> {
        self.fetch_balance().await
    }

    async fn open_positions(&self) -> Result<Vec<OpenPosition>, ExchangeError> {
        self.fetch_open_positions().await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        self.change_leverage(symbol, leverage).await
    }

    async fn market_order(&self, order: &MarketOrder) -> Result<OrderResponse, ExchangeError> {
        self.place_market_order(order).await
    }

    async fn stop_market_order(
        &self,
        order: &StopMarketOrder,
    ) -> Result<OrderResponse, ExchangeError> {
        self.place_stop_market_order(order).await
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        self.cancel_all_open_orders(symbol).await
    }

    async fn funding_income(&self, limit: u32) -> Result<Vec<FundingIncome>, ExchangeError> {
        self.fetch_funding_income(limit).await
    }
}
