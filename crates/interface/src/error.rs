use thiserror::Error;

/// 거래소 게이트웨이 호출 실패
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error: status {status}, response: {body}")]
    Api { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

impl ExchangeError {
    /// 거래소에 아예 닿지 못한 경우 (연결 실패, 타임아웃 등)
    /// 이 경우 사이클 전체를 중단해야 한다.
    pub fn is_connectivity(&self) -> bool {
        match self {
            ExchangeError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    /// 응답 본문이 너무 길 때 잘라서 에러로 만든다.
    pub fn api(status: u16, body: &str) -> Self {
        ExchangeError::Api {
            status,
            body: body.chars().take(200).collect(),
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        ExchangeError::Parse(e.to_string())
    }
}
