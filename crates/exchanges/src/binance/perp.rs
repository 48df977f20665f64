use std::collections::HashMap;

use chrono::DateTime;
use serde::Deserialize;

use super::{parse_num, BinanceClient};
use interface::{ExchangeError, FundingRecord, SymbolTradingRules};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    #[serde(default)]
    contract_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    price_precision: u32,
    #[serde(default)]
    quantity_precision: u32,
    #[serde(default)]
    filters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinancePremiumIndex {
    symbol: String,
    last_funding_rate: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceFundingRate {
    symbol: String,
    funding_rate: String,
    funding_time: i64,
}

#[derive(Debug, Deserialize)]
struct BinanceTickerPrice {
    price: String,
}

impl ExchangeInfo {
    /// PERPETUAL + TRADING 상태인 심볼만
    pub(crate) fn perpetual_symbols(&self) -> Vec<String> {
        self.symbols
            .iter()
            .filter(|s| s.contract_type == "PERPETUAL" && s.status == "TRADING")
            .map(|s| s.symbol.clone())
            .collect()
    }

    /// LOT_SIZE 필터와 precision으로 주문 규칙 구성
    pub(crate) fn trading_rules(&self, symbol: &str) -> Result<SymbolTradingRules, ExchangeError> {
        let info = self
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::Other(format!("symbol not found: {}", symbol)))?;

        let lot_size = info
            .filters
            .iter()
            .find(|f| f.get("filterType").and_then(|v| v.as_str()) == Some("LOT_SIZE"))
            .ok_or_else(|| {
                ExchangeError::Parse(format!("LOT_SIZE filter missing for {}", symbol))
            })?;

        let field = |name: &str| -> Result<f64, ExchangeError> {
            let raw = lot_size
                .get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| ExchangeError::Parse(format!("{} missing for {}", name, symbol)))?;
            parse_num(raw)
        };

        Ok(SymbolTradingRules {
            min_qty: field("minQty")?,
            step_size: field("stepSize")?,
            quantity_precision: info.quantity_precision,
            price_precision: info.price_precision,
        })
    }
}

impl BinanceClient {
    pub async fn server_ping(&self) -> Result<(), ExchangeError> {
        let _: serde_json::Value = self.get_public("/fapi/v1/ping", "").await?;
        Ok(())
    }

    pub(crate) async fn exchange_info(&self) -> Result<ExchangeInfo, ExchangeError> {
        self.get_public("/fapi/v1/exchangeInfo", "").await
    }

    pub async fn fetch_perpetual_symbols(&self) -> Result<Vec<String>, ExchangeError> {
        Ok(self.exchange_info().await?.perpetual_symbols())
    }

    /// 매번 새로 조회한다 (캐시하지 않음)
    pub async fn fetch_trading_rules(
        &self,
        symbol: &str,
    ) -> Result<SymbolTradingRules, ExchangeError> {
        self.exchange_info().await?.trading_rules(symbol)
    }

    /// premiumIndex의 lastFundingRate = 진행 중인 정산 주기의 예상 펀딩비
    pub async fn fetch_funding_rates(&self) -> Result<HashMap<String, f64>, ExchangeError> {
        let premium: Vec<BinancePremiumIndex> =
            self.get_public("/fapi/v1/premiumIndex", "").await?;
        Ok(parse_premium_rates(premium))
    }

    pub async fn fetch_funding_history(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<FundingRecord>, ExchangeError> {
        let query = format!("symbol={}&limit={}", symbol, limit);
        let raw: Vec<BinanceFundingRate> = self.get_public("/fapi/v1/fundingRate", &query).await?;
        parse_funding_history(raw)
    }

    pub async fn fetch_last_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let query = format!("symbol={}", symbol);
        let ticker: BinanceTickerPrice = self.get_public("/fapi/v1/ticker/price", &query).await?;
        parse_num(&ticker.price)
    }
}

fn parse_premium_rates(premium: Vec<BinancePremiumIndex>) -> HashMap<String, f64> {
    let mut out = HashMap::new();
    for p in premium {
        // 파싱 안 되는 레코드는 이번 스캔에서 제외
        match p.last_funding_rate.parse::<f64>() {
            Ok(rate) => {
                out.insert(p.symbol, rate);
            }
            Err(_) => {
                tracing::debug!("skip {}: bad lastFundingRate {:?}", p.symbol, p.last_funding_rate);
            }
        }
    }
    out
}

fn parse_funding_history(
    raw: Vec<BinanceFundingRate>,
) -> Result<Vec<FundingRecord>, ExchangeError> {
    let mut records = raw
        .into_iter()
        .map(|r| {
            let funding_time = DateTime::from_timestamp_millis(r.funding_time).ok_or_else(|| {
                ExchangeError::Parse(format!("invalid fundingTime {}", r.funding_time))
            })?;
            Ok(FundingRecord {
                rate: parse_num(&r.funding_rate)?,
                symbol: r.symbol,
                funding_time,
            })
        })
        .collect::<Result<Vec<_>, ExchangeError>>()?;
    records.sort_by_key(|r| r.funding_time);
    Ok(records)
}
