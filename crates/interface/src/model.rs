use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 펀딩 정산 주기. 바이낸스 USDⓈ-M 무기한 선물은 4시간 또는 8시간 주기만 다룬다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundingInterval {
    FourHours,
    EightHours,
}

impl FundingInterval {
    pub fn hours(self) -> u32 {
        match self {
            FundingInterval::FourHours => 4,
            FundingInterval::EightHours => 8,
        }
    }

    pub fn seconds(self) -> i64 {
        i64::from(self.hours()) * 3600
    }

    /// 정산 간격(시간 단위)으로부터 주기를 결정한다. 4h/8h 외에는 None.
    pub fn from_hours(hours: i64) -> Option<Self> {
        match hours {
            4 => Some(FundingInterval::FourHours),
            8 => Some(FundingInterval::EightHours),
            _ => None,
        }
    }
}

impl Default for FundingInterval {
    fn default() -> Self {
        FundingInterval::EightHours
    }
}

impl fmt::Display for FundingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.hours())
    }
}

/// 심볼별 예상 펀딩비와 정산 주기. 매 스캔마다 새로 만든다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRate {
    pub symbol: String,
    /// 부호 있는 비율 (예: -0.004 = -0.4%)
    pub rate: f64,
    pub interval: FundingInterval,
}

/// 주문 수량/가격 규칙 (exchangeInfo)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolTradingRules {
    pub min_qty: f64,
    pub step_size: f64,
    pub quantity_precision: u32,
    pub price_precision: u32,
}

/// 과거 펀딩 정산 기록 (fundingRate 히스토리)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRecord {
    pub symbol: String,
    pub rate: f64,
    pub funding_time: DateTime<Utc>,
}

/// 계정에 실제로 입금된 펀딩비 수입 기록 (income 히스토리). 읽기 전용.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingIncome {
    pub symbol: String,
    pub income: f64,
    pub time: DateTime<Utc>,
}

/// 거래소에 열려 있는 포지션
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub position_amt: f64,
    pub entry_price: f64,
}
