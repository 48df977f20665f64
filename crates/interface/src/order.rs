use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 시장가 주문 요청
#[derive(Debug, Clone, PartialEq)]
pub struct MarketOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// 수량을 문자열로 보낼 때 사용할 소수점 자리수
    pub quantity_precision: u32,
    pub reduce_only: bool,
    /// 헤지 모드일 때만 `LONG` 등으로 지정
    pub position_side: Option<String>,
}

/// 손절용 STOP_MARKET 주문 요청 (closePosition=true)
#[derive(Debug, Clone, PartialEq)]
pub struct StopMarketOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub stop_price: f64,
    pub price_precision: u32,
    pub position_side: Option<String>,
}

/// 주문 응답
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: Option<u64>,
    pub client_order_id: Option<String>,
    pub executed_qty: Option<String>,
    pub avg_price: Option<String>,
    pub status: Option<String>,
}

impl OrderResponse {
    pub fn executed_qty(&self) -> f64 {
        parse_positive(self.executed_qty.as_deref())
    }

    pub fn avg_price(&self) -> f64 {
        parse_positive(self.avg_price.as_deref())
    }

    /// 체결 확인: FILLED 또는 부분 체결이면서 체결 수량이 있어야 한다.
    pub fn is_filled(&self) -> bool {
        matches!(self.status.as_deref(), Some("FILLED") | Some("PARTIALLY_FILLED"))
            && self.executed_qty() > 0.0
    }
}

fn parse_positive(value: Option<&str>) -> f64 {
    value
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| *v > 0.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_response() {
        let raw = r#"{
            "symbol": "ABCUSDT",
            "orderId": 283194212,
            "clientOrderId": "fs-1",
            "executedQty": "2.647",
            "avgPrice": "37.781",
            "status": "FILLED",
            "side": "BUY",
            "type": "MARKET"
        }"#;
        let order: OrderResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(order.order_id, Some(283194212));
        assert!(order.is_filled());
        assert!((order.executed_qty() - 2.647).abs() < 1e-12);
        assert!((order.avg_price() - 37.781).abs() < 1e-12);
    }

    #[test]
    fn new_status_is_not_a_fill() {
        let order = OrderResponse {
            symbol: "ABCUSDT".to_string(),
            executed_qty: Some("0".to_string()),
            avg_price: Some("0.00000".to_string()),
            status: Some("NEW".to_string()),
            ..Default::default()
        };
        assert!(!order.is_filled());
        assert_eq!(order.avg_price(), 0.0);
    }
}
