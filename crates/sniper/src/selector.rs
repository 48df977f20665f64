use std::{cmp::Ordering, fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};

use crate::schedule::seconds_to_funding;
use interface::{FundingInterval, SymbolRate};

/// 후보가 여러 개일 때 어떤 심볼을 고를지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// 정산이 가장 가까운 심볼. 허용 오차 안에서 동률이면 펀딩비가 더 음수인 쪽.
    NearestThenMostNegative,
    /// 정산 시각과 무관하게 펀딩비가 가장 음수인 심볼
    MostNegative,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectionPolicy::NearestThenMostNegative => "nearest",
            SelectionPolicy::MostNegative => "most_negative",
        };
        f.write_str(s)
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(SelectionPolicy::NearestThenMostNegative),
            "most_negative" => Ok(SelectionPolicy::MostNegative),
            other => Err(format!("unknown selection policy: {other}")),
        }
    }
}

/// 임계값을 통과하고 정산까지 남은 시간이 붙은 후보
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleCandidate {
    pub symbol: String,
    pub rate: f64,
    pub interval: FundingInterval,
    pub seconds_to_funding: f64,
}

/// 선택 결과. 주문 직전에 selected_at 기준으로 신선도를 다시 확인한다.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub candidate: EligibleCandidate,
    pub selected_at: DateTime<Utc>,
}

pub fn filter_eligible(rates: &[SymbolRate], threshold: f64) -> Vec<SymbolRate> {
    rates
        .iter()
        .filter(|r| r.rate <= threshold)
        .cloned()
        .collect()
}

pub fn annotate(eligible: Vec<SymbolRate>, now: DateTime<Utc>) -> Vec<EligibleCandidate> {
    eligible
        .into_iter()
        .map(|r| EligibleCandidate {
            seconds_to_funding: seconds_to_funding(now, r.interval),
            symbol: r.symbol,
            rate: r.rate,
            interval: r.interval,
        })
        .collect()
}

pub fn pick(
    candidates: &[EligibleCandidate],
    policy: SelectionPolicy,
    tie_tolerance: Duration,
) -> Option<EligibleCandidate> {
    match policy {
        SelectionPolicy::NearestThenMostNegative => {
            let nearest = candidates
                .iter()
                .map(|c| c.seconds_to_funding)
                .fold(f64::INFINITY, f64::min);
            let cutoff = nearest + tie_tolerance.as_secs_f64();
            candidates
                .iter()
                .filter(|c| c.seconds_to_funding <= cutoff)
                .min_by(|a, b| by_rate(a, b).then_with(|| a.symbol.cmp(&b.symbol)))
                .cloned()
        }
        SelectionPolicy::MostNegative => candidates
            .iter()
            .min_by(|a, b| {
                by_rate(a, b)
                    .then_with(|| by_time(a, b))
                    .then_with(|| a.symbol.cmp(&b.symbol))
            })
            .cloned(),
    }
}

/// 필터 → 시간 계산 → 쿨다운 제외 → 선택
pub fn select<F>(
    rates: &[SymbolRate],
    threshold: f64,
    now: DateTime<Utc>,
    policy: SelectionPolicy,
    tie_tolerance: Duration,
    in_cooldown: F,
) -> Option<Selection>
where
    F: Fn(&str) -> bool,
{
    let candidates: Vec<EligibleCandidate> = annotate(filter_eligible(rates, threshold), now)
        .into_iter()
        .filter(|c| !in_cooldown(&c.symbol))
        .collect();

    pick(&candidates, policy, tie_tolerance).map(|candidate| Selection {
        candidate,
        selected_at: now,
    })
}

fn by_rate(a: &EligibleCandidate, b: &EligibleCandidate) -> Ordering {
    a.rate.partial_cmp(&b.rate).unwrap_or(Ordering::Equal)
}

fn by_time(a: &EligibleCandidate, b: &EligibleCandidate) -> Ordering {
    a.seconds_to_funding
        .partial_cmp(&b.seconds_to_funding)
        .unwrap_or(Ordering::Equal)
}
