//! 펀딩 정산 시각 계산과 타이밍 구간 분류.
//!
//! 정산은 UTC 자정 기준으로 주기(4h/8h)의 배수가 되는 정각에 일어난다.
//! 8시간 정산 시각은 모두 4시간 정산 시각이기도 하므로, 4시간 격자만 따라가면
//! 어떤 심볼의 진입 구간도 놓치지 않는다.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};

use crate::config::WindowConfig;
use interface::FundingInterval;

/// 현재 시각 공급자. 테스트에서는 수동 시계로 바꿔 끼운다.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 정산 직후
    Dead,
    /// approach 경계 밖
    Far,
    /// approach 경계 ~ 진입 구간 시작
    Approach,
    EntryWindow,
    /// 진입 구간이 끝난 뒤 청산 구간 전까지 (보유만)
    Hold,
    CloseWindow,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Dead => "dead",
            Phase::Far => "far",
            Phase::Approach => "approach",
            Phase::EntryWindow => "entry-window",
            Phase::Hold => "hold",
            Phase::CloseWindow => "close-window",
        };
        f.write_str(s)
    }
}

/// `now` 이후의 다음 정산 시각 (정각에 있으면 그 다음 정산)
pub fn next_funding_time(now: DateTime<Utc>, interval: FundingInterval) -> DateTime<Utc> {
    let period = ChronoDuration::hours(i64::from(interval.hours()));
    // 주기가 하루를 나누어 떨어지므로 epoch 기준 반올림 == UTC 자정 기준 반올림
    match now.duration_trunc(period) {
        Ok(start) => start + period,
        Err(_) => now + period,
    }
}

/// 다음 정산까지 남은 초. 항상 (0, interval*3600] 범위.
pub fn seconds_to_funding(now: DateTime<Utc>, interval: FundingInterval) -> f64 {
    let remaining = next_funding_time(now, interval) - now;
    remaining.num_milliseconds() as f64 / 1000.0
}

pub fn classify(seconds_to_funding: f64, interval: FundingInterval, window: &WindowConfig) -> Phase {
    let s = seconds_to_funding;
    let period = interval.seconds() as f64;

    if s > period - window.dead_zone.as_secs_f64() {
        Phase::Dead
    } else if s > window.approach.as_secs_f64() {
        Phase::Far
    } else if s > window.entry_open.as_secs_f64() {
        Phase::Approach
    } else if s >= window.entry_close.as_secs_f64() {
        Phase::EntryWindow
    } else if s > window.close_window.as_secs_f64() {
        Phase::Hold
    } else {
        Phase::CloseWindow
    }
}

/// 다음 정기 스캔 경계 (UTC 자정 기준 scan_interval의 배수)까지 남은 시간
pub fn until_next_scan_boundary(now: DateTime<Utc>, scan_interval: Duration) -> Duration {
    let interval_ms = scan_interval.as_millis().max(1) as i64;
    let ms_of_day = now.timestamp_millis().rem_euclid(86_400_000);
    let elapsed = ms_of_day % interval_ms;
    Duration::from_millis((interval_ms - elapsed) as u64)
}

/// 4시간 격자에서 다음 "진입 구간 시작" 시점까지 남은 시간.
/// 지금이 이미 진입 구간 시작을 지났으면 다음 정산 주기의 것.
pub fn until_next_entry_checkpoint(now: DateTime<Utc>, window: &WindowConfig) -> Duration {
    let open = window.entry_open.as_secs_f64();
    let s = seconds_to_funding(now, FundingInterval::FourHours);
    let wait = if s > open {
        s - open
    } else {
        s + FundingInterval::FourHours.seconds() as f64 - open
    };
    secs(wait)
}

/// 음수나 NaN은 0으로
pub fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
