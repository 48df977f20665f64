use std::{fmt, time::Duration};

use thiserror::Error;

use crate::config::Config;
use interface::ExchangeError;

/// 알림 분류와 재시도 대기 시간을 정하는 에러 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Unavailable,
    OrderPlacement,
    Critical,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::OrderPlacement => "order-placement",
            ErrorKind::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// 한 사이클을 중단시키는 에러
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("exchange unreachable: {0}")]
    Connectivity(#[source] ExchangeError),

    #[error("market data unavailable: {0}")]
    Unavailable(#[source] ExchangeError),

    #[error("order failed for {symbol}: {source}")]
    OrderPlacement {
        symbol: String,
        #[source]
        source: ExchangeError,
    },

    #[error("{0}")]
    Critical(String),
}

impl EngineError {
    /// 조회 실패를 연결 실패/일시적 실패로 나눈다.
    pub fn from_fetch(e: ExchangeError) -> Self {
        if e.is_connectivity() {
            EngineError::Connectivity(e)
        } else {
            EngineError::Unavailable(e)
        }
    }

    pub fn order(symbol: &str, source: ExchangeError) -> Self {
        EngineError::OrderPlacement {
            symbol: symbol.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Connectivity(_) => ErrorKind::Connectivity,
            EngineError::Unavailable(_) => ErrorKind::Unavailable,
            EngineError::OrderPlacement { .. } => ErrorKind::OrderPlacement,
            EngineError::Critical(_) => ErrorKind::Critical,
        }
    }
}

impl From<ExchangeError> for EngineError {
    fn from(e: ExchangeError) -> Self {
        EngineError::from_fetch(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub connectivity: Duration,
    pub unavailable: Duration,
    pub order_placement: Duration,
    pub critical: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connectivity: config.error_backoff,
            unavailable: Duration::from_secs(15),
            order_placement: Duration::from_secs(10),
            critical: config.error_backoff,
        }
    }

    pub fn for_kind(&self, kind: ErrorKind) -> Duration {
        match kind {
            ErrorKind::Connectivity => self.connectivity,
            ErrorKind::Unavailable => self.unavailable,
            ErrorKind::OrderPlacement => self.order_placement,
            ErrorKind::Critical => self.critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_transport_failures_are_unavailable() {
        let e = EngineError::from_fetch(ExchangeError::api(503, "busy"));
        assert_eq!(e.kind(), ErrorKind::Unavailable);

        let e: EngineError = ExchangeError::Parse("bad json".to_string()).into();
        assert_eq!(e.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn order_error_names_symbol() {
        let e = EngineError::order("ABCUSDT", ExchangeError::Other("rejected".to_string()));
        assert_eq!(e.kind(), ErrorKind::OrderPlacement);
        assert_eq!(e.to_string(), "order failed for ABCUSDT: rejected");
    }

    #[test]
    fn backoff_by_kind() {
        let policy = BackoffPolicy::from_config(&Config::default());
        assert_eq!(policy.for_kind(ErrorKind::Connectivity), Duration::from_secs(60));
        assert_eq!(policy.for_kind(ErrorKind::Critical), Duration::from_secs(60));
        assert_eq!(policy.for_kind(ErrorKind::Unavailable), Duration::from_secs(15));
        assert_eq!(policy.for_kind(ErrorKind::OrderPlacement), Duration::from_secs(10));
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ErrorKind::OrderPlacement.to_string(), "order-placement");
        assert_eq!(ErrorKind::Connectivity.to_string(), "connectivity");
    }
}
