use std::env;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::debug;

use interface::ExchangeError;

pub mod account;
mod gateway;
pub mod order;
pub mod perp;

pub const FUTURES_BASE_URL: &str = "https://fapi.binance.com";

const RECV_WINDOW: u64 = 5000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Binance USDⓈ-M 선물 클라이언트 (시세, 계정, 주문 모두 지원)
#[derive(Clone)]
pub struct BinanceClient {
    pub(crate) http: reqwest::Client,
    pub(crate) api_key: Option<String>,
    pub(crate) api_secret: Option<String>,
    pub(crate) base_url: String,
}

impl BinanceClient {
    /// 공개 API만 사용하는 경우 (펀딩비, 가격 등)
    pub fn new() -> Self {
        Self {
            http: build_http(),
            api_key: None,
            api_secret: None,
            base_url: FUTURES_BASE_URL.to_string(),
        }
    }

    /// 인증이 필요한 API를 사용하는 경우 (잔고, 주문 등)
    pub fn with_credentials() -> Result<Self, ExchangeError> {
        let (api_key, api_secret) = get_api_credentials()?;
        Ok(Self {
            http: build_http(),
            api_key: Some(api_key),
            api_secret: Some(api_secret),
            base_url: FUTURES_BASE_URL.to_string(),
        })
    }

    /// 키가 있으면 인증 클라이언트, 없으면 공개 클라이언트
    pub fn from_env() -> Self {
        Self::with_credentials().unwrap_or_else(|_| Self::new())
    }

    /// 공개 GET 요청
    pub(crate) async fn get_public<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<T, ExchangeError> {
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query)
        };

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(ExchangeError::api(status.as_u16(), &response_text));
        }

        Ok(serde_json::from_str(&response_text)?)
    }

    /// 서명이 필요한 요청. query에 timestamp/recvWindow/signature를 붙여서 보낸다.
    pub(crate) async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &str,
    ) -> Result<T, ExchangeError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ExchangeError::Other("API key not set".to_string()))?;
        let api_secret = self
            .api_secret
            .as_ref()
            .ok_or_else(|| ExchangeError::Other("API secret not set".to_string()))?;

        let timestamp = get_timestamp();
        let query_string = if query.is_empty() {
            format!("timestamp={}&recvWindow={}", timestamp, RECV_WINDOW)
        } else {
            format!("{}&timestamp={}&recvWindow={}", query, timestamp, RECV_WINDOW)
        };
        debug!("{} {} query_string: {}", method, endpoint, query_string);
        let signature = generate_signature(&query_string, api_secret);

        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, endpoint, query_string, signature
        );

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", api_key.as_str())
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(ExchangeError::api(status.as_u16(), &response_text));
        }

        Ok(serde_json::from_str(&response_text)?)
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

fn build_http() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

type HmacSha256 = Hmac<Sha256>;

/// Binance API 서명 생성
/// query_string: 쿼리 파라미터 문자열 (예: "symbol=BTCUSDT&timestamp=1234567890")
/// api_secret: API Secret Key
pub fn generate_signature(query_string: &str, api_secret: &str) -> String {
    // HMAC은 어떤 길이의 키도 받는다
    let mut mac = match HmacSha256::new_from_slice(api_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(query_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// 타임스탬프 생성 (밀리초)
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 환경변수에서 API 키와 시크릿 가져오기
pub fn get_api_credentials() -> Result<(String, String), ExchangeError> {
    let api_key = env::var("BINANCE_API_KEY")
        .map_err(|e| ExchangeError::Other(format!("BINANCE_API_KEY not found: {}", e)))?;
    let api_secret = env::var("BINANCE_API_SECRET")
        .map_err(|e| ExchangeError::Other(format!("BINANCE_API_SECRET not found: {}", e)))?;
    Ok((api_key, api_secret))
}

/// 바이낸스는 숫자를 문자열로 내려준다
pub(crate) fn parse_num(value: &str) -> Result<f64, ExchangeError> {
    value
        .parse::<f64>()
        .map_err(|e| ExchangeError::Parse(format!("invalid number {:?}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_binance_docs_example() {
        // https://binance-docs.github.io/apidocs/spot/en/#signed-trade-user_data-and-margin-endpoint-security
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            generate_signature(query, secret),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn parse_num_rejects_garbage() {
        assert_eq!(parse_num("0.0100").unwrap(), 0.01);
        assert!(matches!(parse_num("n/a"), Err(ExchangeError::Parse(_))));
    }

    #[tokio::test]
    async fn signed_call_without_credentials_fails_fast() {
        let client = BinanceClient::new();
        let result: Result<serde_json::Value, _> =
            client.send_signed(Method::GET, "/fapi/v2/balance", "").await;
        match result {
            Err(ExchangeError::Other(msg)) => assert_eq!(msg, "API key not set"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
