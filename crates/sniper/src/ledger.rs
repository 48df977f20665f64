use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::EngineError;
use crate::lifecycle::PositionEntry;
use crate::notifier::{Alert, AlertKind, Notifier};
use crate::schedule::Clock;
use exchanges::FuturesGateway;
use interface::{ExchangeError, FundingIncome};

const INCOME_LIMIT: u32 = 1000;

/// 청산된 거래 하나의 실현 손익
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResult {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_notional: f64,
    pub exit_notional: f64,
    pub realized_pnl: f64,
    pub pnl_percent: f64,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
}

/// (실현 손익, 손익률 %). 진입 명목가가 0이면 손익률은 0.
pub fn compute_pnl(entry_notional: f64, exit_notional: f64) -> (f64, f64) {
    let pnl = exit_notional - entry_notional;
    let percent = if entry_notional == 0.0 {
        0.0
    } else {
        pnl / entry_notional * 100.0
    };
    (pnl, percent)
}

impl TradeResult {
    pub fn from_close(entry: &PositionEntry, exit_price: f64, exit_timestamp: DateTime<Utc>) -> Self {
        let exit_notional = exit_price * entry.quantity;
        let (realized_pnl, pnl_percent) = compute_pnl(entry.entry_notional, exit_notional);
        Self {
            symbol: entry.symbol.clone(),
            quantity: entry.quantity,
            entry_price: entry.entry_price,
            exit_price,
            entry_notional: entry.entry_notional,
            exit_notional,
            realized_pnl,
            pnl_percent,
            entry_timestamp: entry.entry_timestamp,
            exit_timestamp,
        }
    }
}

/// 펀딩비 수입 집계
#[derive(Debug, Clone, PartialEq)]
pub struct FundingSummary {
    /// 최근 window 안의 합계
    pub recent_total: f64,
    /// 최근 window 안에서 0이 아닌 기록 수
    pub recent_count: usize,
    /// 받아온 기록 전체 합계
    pub total: f64,
    pub fetched: usize,
}

impl FundingSummary {
    pub fn from_records(records: &[FundingIncome], now: DateTime<Utc>, window: ChronoDuration) -> Self {
        let recent: Vec<&FundingIncome> = records
            .iter()
            .filter(|r| now - r.time <= window)
            .collect();
        Self {
            recent_total: recent.iter().map(|r| r.income).sum(),
            recent_count: recent.iter().filter(|r| r.income != 0.0).count(),
            total: records.iter().map(|r| r.income).sum(),
            fetched: records.len(),
        }
    }

    pub fn format_report(&self) -> String {
        format!(
            "funding income 24h: {:+.4} USDT over {} payments | all fetched ({}): {:+.4} USDT",
            self.recent_total, self.recent_count, self.fetched, self.total
        )
    }
}

/// 펀딩비 수입을 한 번 조회해서 알림으로 보낸다.
pub async fn run_report_once(
    gateway: &dyn FuturesGateway,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> Result<FundingSummary, ExchangeError> {
    let records = gateway.funding_income(INCOME_LIMIT).await?;
    let summary = FundingSummary::from_records(&records, now, ChronoDuration::hours(24));
    notifier
        .notify(Alert::new(AlertKind::Report, summary.format_report()))
        .await;
    Ok(summary)
}

/// 거래 사이클과 별개로 주기적으로 리포트를 보내는 태스크.
/// 포지션 상태는 건드리지 않는다.
pub fn spawn_funding_report(
    gateway: Arc<dyn FuturesGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + every;
        let mut ticker = tokio::time::interval_at(start, every);
        loop {
            ticker.tick().await;
            match run_report_once(gateway.as_ref(), notifier.as_ref(), clock.now()).await {
                Ok(summary) => info!("{}", summary.format_report()),
                Err(e) => {
                    error!("funding report failed: {}", e);
                    let e = EngineError::from_fetch(e);
                    notifier
                        .notify(Alert::new(
                            AlertKind::Error(e.kind()),
                            format!("funding report failed: {}", e),
                        ))
                        .await;
                }
            }
        }
    })
}
