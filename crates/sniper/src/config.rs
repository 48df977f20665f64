use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

use crate::selector::SelectionPolicy;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("inconsistent config: {0}")]
    Inconsistent(String),
}

/// 정산 시각까지 남은 시간 기준의 구간 경계값
#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    /// 이 안으로 들어오면 시간 단위 폴링 대신 smart wait로 전환
    pub approach: Duration,
    /// 진입 구간 시작 (예: 정산 50분 전)
    pub entry_open: Duration,
    /// 진입 구간 끝 (예: 정산 45분 전)
    pub entry_close: Duration,
    /// 실제 진입을 노리는 시점 (진입 구간 안쪽)
    pub entry_target: Duration,
    /// 청산 구간 (정산 직전)
    pub close_window: Duration,
    /// 정산 직후 구간
    pub dead_zone: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            approach: Duration::from_secs(60 * 60),
            entry_open: Duration::from_secs(50 * 60),
            entry_close: Duration::from_secs(45 * 60),
            entry_target: Duration::from_secs(46 * 60),
            close_window: Duration::from_secs(60),
            dead_zone: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

/// 실행 중에는 바뀌지 않는 설정값
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// 이 값 이하의 펀딩비만 진입 후보 (예: -0.003 = -0.3%)
    pub threshold: f64,
    /// 한 번 진입할 때 쓰는 명목가 (USDT)
    pub capital: f64,
    pub leverage: u32,
    /// 잔고가 이 값 미만이면 진입하지 않음
    pub minimum_balance: f64,
    pub cooldown: Duration,
    pub window: WindowConfig,
    /// 정산 몇 초 전에 청산할지
    pub exit_lead: Duration,
    pub scan_interval: Duration,
    pub report_interval: Duration,
    pub stop_loss_pct: f64,
    pub selection_policy: SelectionPolicy,
    pub tie_tolerance: Duration,
    /// 선택 후 이 시간이 지나면 주문 전에 다시 선택
    pub freshness: Duration,
    /// 6개 게이트가 모두 끝나야 하는 시간
    pub validation_window: Duration,
    pub open_position_poll: Duration,
    pub error_backoff: Duration,
    /// 헤지 모드면 positionSide=LONG으로 주문
    pub hedge_mode: bool,
    pub dry_run: bool,
    pub telegram: Option<TelegramConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: -0.003,
            capital: 100.0,
            leverage: 1,
            minimum_balance: 10.0,
            cooldown: Duration::from_secs(5 * 60),
            window: WindowConfig::default(),
            exit_lead: Duration::from_secs(60),
            scan_interval: Duration::from_secs(60 * 60),
            report_interval: Duration::from_secs(12 * 60 * 60),
            stop_loss_pct: 0.10,
            selection_policy: SelectionPolicy::NearestThenMostNegative,
            tie_tolerance: Duration::from_secs(3),
            freshness: Duration::from_secs(3),
            validation_window: Duration::from_secs(2),
            open_position_poll: Duration::from_secs(60),
            error_backoff: Duration::from_secs(60),
            hedge_mode: false,
            dry_run: false,
            telegram: None,
        }
    }
}

impl Config {
    /// 환경변수에서 설정 로드 (.env는 lib 로드 시 자동 적용)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();
        let minutes = |key, default: Duration| {
            parse_or(&lookup, key, default.as_secs() / 60).map(|m| Duration::from_secs(m * 60))
        };
        let seconds = |key, default: Duration| {
            parse_or(&lookup, key, default.as_secs()).map(Duration::from_secs)
        };

        let window = WindowConfig {
            approach: minutes("APPROACH_MINUTES", d.window.approach)?,
            entry_open: minutes("ENTRY_WINDOW_OPEN_MINUTES", d.window.entry_open)?,
            entry_close: minutes("ENTRY_WINDOW_CLOSE_MINUTES", d.window.entry_close)?,
            entry_target: seconds("ENTRY_TARGET_SECONDS", d.window.entry_target)?,
            close_window: seconds("CLOSE_WINDOW_SECONDS", d.window.close_window)?,
            dead_zone: seconds("DEAD_ZONE_SECONDS", d.window.dead_zone)?,
        };

        let telegram = match (lookup("TELEGRAM_TOKEN"), lookup("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                Some(TelegramConfig { token, chat_id })
            }
            _ => None,
        };

        let config = Config {
            threshold: parse_or(&lookup, "FUNDING_RATE_THRESHOLD", d.threshold)?,
            capital: parse_or(&lookup, "TRADE_CAPITAL_USDT", d.capital)?,
            leverage: parse_or(&lookup, "LEVERAGE", d.leverage)?,
            minimum_balance: parse_or(&lookup, "MINIMUM_BALANCE_USDT", d.minimum_balance)?,
            cooldown: minutes("COOLDOWN_MINUTES", d.cooldown)?,
            window,
            exit_lead: seconds("EXIT_LEAD_SECONDS", d.exit_lead)?,
            scan_interval: minutes("SCAN_INTERVAL_MINUTES", d.scan_interval)?,
            report_interval: parse_or(&lookup, "REPORT_INTERVAL_HOURS", 12u64)
                .map(|h| Duration::from_secs(h * 3600))?,
            stop_loss_pct: parse_or(&lookup, "STOP_LOSS_PCT", d.stop_loss_pct)?,
            selection_policy: parse_or(&lookup, "SELECTION_POLICY", d.selection_policy)?,
            tie_tolerance: seconds("TIE_TOLERANCE_SECONDS", d.tie_tolerance)?,
            freshness: seconds("FRESHNESS_SECONDS", d.freshness)?,
            validation_window: seconds("VALIDATION_WINDOW_SECONDS", d.validation_window)?,
            open_position_poll: seconds("OPEN_POSITION_POLL_SECONDS", d.open_position_poll)?,
            error_backoff: seconds("ERROR_BACKOFF_SECONDS", d.error_backoff)?,
            hedge_mode: parse_or(&lookup, "HEDGE_MODE", d.hedge_mode)?,
            dry_run: parse_or(&lookup, "DRY_RUN", d.dry_run)?,
            telegram,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.window;
        if w.close_window.is_zero() {
            return Err(ConfigError::Inconsistent(
                "close window must be positive".to_string(),
            ));
        }
        if !(w.close_window < w.entry_close
            && w.entry_close <= w.entry_target
            && w.entry_target <= w.entry_open
            && w.entry_open <= w.approach)
        {
            return Err(ConfigError::Inconsistent(format!(
                "expected close({}s) < entry_close({}s) <= target({}s) <= entry_open({}s) <= approach({}s)",
                w.close_window.as_secs(),
                w.entry_close.as_secs(),
                w.entry_target.as_secs(),
                w.entry_open.as_secs(),
                w.approach.as_secs()
            )));
        }
        // 4시간 주기 안에 모든 구간이 들어가야 한다
        if w.approach.as_secs() + w.dead_zone.as_secs() >= 4 * 3600 {
            return Err(ConfigError::Inconsistent(
                "approach + dead zone must fit in a 4h funding period".to_string(),
            ));
        }
        if self.capital <= 0.0 {
            return Err(ConfigError::Inconsistent("capital must be > 0".to_string()));
        }
        if self.leverage == 0 {
            return Err(ConfigError::Inconsistent("leverage must be >= 1".to_string()));
        }
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(ConfigError::Inconsistent(
                "stop loss pct must be in (0, 1)".to_string(),
            ));
        }
        // 0이면 interval_at이 패닉하거나 루프가 쉬지 않고 돈다
        let periods = [
            ("scan interval", self.scan_interval),
            ("report interval", self.report_interval),
            ("open position poll", self.open_position_poll),
            ("error backoff", self.error_backoff),
        ];
        for (name, period) in periods {
            if period.is_zero() {
                return Err(ConfigError::Inconsistent(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
