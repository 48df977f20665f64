use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use exchanges::FuturesGateway;
use interface::{ExchangeError, FundingInterval, FundingRecord, SymbolRate};

const HISTORY_LIMIT: u32 = 3;

/// 한 번의 스캔에서 만든 심볼별 펀딩비 테이블
#[derive(Debug, Clone, Default)]
pub struct RateCatalog {
    pub rates: Vec<SymbolRate>,
    active: HashSet<String>,
    /// 히스토리로 정산 주기를 확인한 심볼
    detected: HashMap<String, FundingInterval>,
}

impl RateCatalog {
    /// 임계값 이하 심볼만 히스토리로 정산 주기를 확인한다.
    /// 나머지는 후보가 될 수 없으므로 기본값(8h)으로 둔다.
    pub async fn build(
        gateway: &dyn FuturesGateway,
        threshold: f64,
    ) -> Result<Self, ExchangeError> {
        let active: HashSet<String> = gateway.active_perpetual_symbols().await?.into_iter().collect();
        let catalog = Self::assemble(gateway, threshold, active, &HashMap::new()).await?;
        info!(
            "rate catalog built: {} symbols, {} screened",
            catalog.rates.len(),
            catalog.detected.len()
        );
        Ok(catalog)
    }

    /// 펀딩비만 다시 받고, 이미 확인한 정산 주기는 재사용한다.
    pub async fn refresh(
        &self,
        gateway: &dyn FuturesGateway,
        threshold: f64,
    ) -> Result<Self, ExchangeError> {
        Self::assemble(gateway, threshold, self.active.clone(), &self.detected).await
    }

    async fn assemble(
        gateway: &dyn FuturesGateway,
        threshold: f64,
        active: HashSet<String>,
        known: &HashMap<String, FundingInterval>,
    ) -> Result<Self, ExchangeError> {
        let funding = gateway.funding_rates().await?;

        let mut symbols: Vec<(&String, f64)> = funding
            .iter()
            .filter(|(symbol, _)| active.contains(*symbol))
            .map(|(symbol, rate)| (symbol, *rate))
            .collect();
        symbols.sort_by(|a, b| a.0.cmp(b.0));

        let mut rates = Vec::with_capacity(symbols.len());
        let mut detected = HashMap::new();

        for (symbol, rate) in symbols {
            let interval = if rate <= threshold {
                match known.get(symbol) {
                    Some(interval) => *interval,
                    None => match resolve_interval(gateway, symbol).await {
                        Some(interval) => interval,
                        // 이번 스캔에서만 제외
                        None => continue,
                    },
                }
            } else {
                FundingInterval::default()
            };

            if rate <= threshold {
                detected.insert(symbol.clone(), interval);
            }
            rates.push(SymbolRate {
                symbol: symbol.clone(),
                rate,
                interval,
            });
        }

        Ok(Self {
            rates,
            active,
            detected,
        })
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolRate> {
        self.rates.iter().find(|r| r.symbol == symbol)
    }
}

async fn resolve_interval(gateway: &dyn FuturesGateway, symbol: &str) -> Option<FundingInterval> {
    match gateway.funding_history(symbol, HISTORY_LIMIT).await {
        Ok(history) => {
            let interval = detect_interval(&history);
            if interval.is_none() {
                warn!("skip {}: unsupported funding interval in history", symbol);
            }
            interval
        }
        Err(e) => {
            warn!("skip {}: funding history unavailable: {}", symbol, e);
            None
        }
    }
}

/// 현재 정산 주기 재확인 (보유 중 청산 시점 계산용)
pub async fn current_interval(
    gateway: &dyn FuturesGateway,
    symbol: &str,
) -> Result<FundingInterval, ExchangeError> {
    let history = gateway.funding_history(symbol, HISTORY_LIMIT).await?;
    detect_interval(&history).ok_or_else(|| {
        ExchangeError::Other(format!("unsupported funding interval for {}", symbol))
    })
}

/// 최근 두 정산 시각의 간격으로 주기를 판단한다.
/// 기록이 하나 이하면 신규 상장으로 보고 8h.
pub fn detect_interval(history: &[FundingRecord]) -> Option<FundingInterval> {
    let mut times: Vec<DateTime<Utc>> = history.iter().map(|r| r.funding_time).collect();
    times.sort();

    match times.as_slice() {
        [.., previous, last] => {
            let gap_secs = (*last - *previous).num_seconds();
            let hours = (gap_secs as f64 / 3600.0).round() as i64;
            debug!("funding gap {}s -> {}h", gap_secs, hours);
            FundingInterval::from_hours(hours)
        }
        _ => Some(FundingInterval::EightHours),
    }
}
