use reqwest::Method;
use tracing::info;
use uuid::Uuid;

use super::BinanceClient;
use interface::{ExchangeError, MarketOrder, OrderResponse, StopMarketOrder};

const CLIENT_ORDER_PREFIX: &str = "fs-";

impl BinanceClient {
    /// 시장가 주문. RESULT 응답으로 받아야 avgPrice/executedQty가 채워진다.
    pub async fn place_market_order(
        &self,
        order: &MarketOrder,
    ) -> Result<OrderResponse, ExchangeError> {
        let query = market_order_query(order, &new_client_order_id());
        info!("place_market_order query_string: {}", query);
        let response: OrderResponse = self
            .send_signed(Method::POST, "/fapi/v1/order", &query)
            .await?;
        info!(
            "place_market_order response: status={:?} executed={:?} avg={:?}",
            response.status, response.executed_qty, response.avg_price
        );
        Ok(response)
    }

    /// 포지션 전체를 닫는 STOP_MARKET (마크 가격 기준)
    pub async fn place_stop_market_order(
        &self,
        order: &StopMarketOrder,
    ) -> Result<OrderResponse, ExchangeError> {
        let query = stop_market_query(order, &new_client_order_id());
        info!("place_stop_market_order query_string: {}", query);
        self.send_signed(Method::POST, "/fapi/v1/order", &query)
            .await
    }

    pub async fn change_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let query = format!("symbol={}&leverage={}", symbol, leverage);
        let _: serde_json::Value = self
            .send_signed(Method::POST, "/fapi/v1/leverage", &query)
            .await?;
        Ok(())
    }

    pub async fn cancel_all_open_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        let query = format!("symbol={}", symbol);
        let _: serde_json::Value = self
            .send_signed(Method::DELETE, "/fapi/v1/allOpenOrders", &query)
            .await?;
        Ok(())
    }
}

fn new_client_order_id() -> String {
    format!("{}{}", CLIENT_ORDER_PREFIX, Uuid::new_v4().simple())
}

fn market_order_query(order: &MarketOrder, client_order_id: &str) -> String {
    let mut query = format!(
        "symbol={}&side={}&type=MARKET&quantity={:.*}&newOrderRespType=RESULT&newClientOrderId={}",
        order.symbol,
        order.side,
        order.quantity_precision as usize,
        order.quantity,
        client_order_id
    );
    if let Some(position_side) = &order.position_side {
        query.push_str(&format!("&positionSide={}", position_side));
    }
    // 헤지 모드에서는 reduceOnly를 보낼 수 없다
    if order.reduce_only && order.position_side.is_none() {
        query.push_str("&reduceOnly=true");
    }
    query
}

fn stop_market_query(order: &StopMarketOrder, client_order_id: &str) -> String {
    let mut query = format!(
        "symbol={}&side={}&type=STOP_MARKET&stopPrice={:.*}&closePosition=true&workingType=MARK_PRICE&newClientOrderId={}",
        order.symbol,
        order.side,
        order.price_precision as usize,
        order.stop_price,
        client_order_id
    );
    if let Some(position_side) = &order.position_side {
        query.push_str(&format!("&positionSide={}", position_side));
    }
    query
}
