use chrono::DateTime;
use reqwest::Method;
use serde::Deserialize;

use super::{parse_num, BinanceClient};
use interface::{ExchangeError, FundingIncome, OpenPosition};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesBalance {
    asset: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
    entry_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomeRecord {
    symbol: String,
    income: String,
    time: i64,
}

impl BinanceClient {
    /// 선물 잔고 조회 (USDT 마진)
    pub async fn fetch_balance(&self) -> Result<f64, ExchangeError> {
        let balances: Vec<FuturesBalance> =
            self.send_signed(Method::GET, "/fapi/v2/balance", "").await?;
        usdt_balance(&balances)
    }

    pub async fn fetch_open_positions(&self) -> Result<Vec<OpenPosition>, ExchangeError> {
        let raw: Vec<PositionRisk> = self
            .send_signed(Method::GET, "/fapi/v2/positionRisk", "")
            .await?;
        parse_open_positions(raw)
    }

    /// 펀딩비 수입(FUNDING_FEE) 기록
    pub async fn fetch_funding_income(
        &self,
        limit: u32,
    ) -> Result<Vec<FundingIncome>, ExchangeError> {
        let query = format!("incomeType=FUNDING_FEE&limit={}", limit);
        let raw: Vec<IncomeRecord> = self
            .send_signed(Method::GET, "/fapi/v1/income", &query)
            .await?;
        parse_income(raw)
    }
}

fn usdt_balance(balances: &[FuturesBalance]) -> Result<f64, ExchangeError> {
    match balances.iter().find(|b| b.asset == "USDT") {
        Some(b) => parse_num(&b.balance),
        None => Ok(0.0),
    }
}

fn parse_open_positions(raw: Vec<PositionRisk>) -> Result<Vec<OpenPosition>, ExchangeError> {
    let mut out = Vec::new();
    for p in raw {
        let position_amt = parse_num(&p.position_amt)?;
        if position_amt == 0.0 {
            continue;
        }
        out.push(OpenPosition {
            entry_price: parse_num(&p.entry_price)?,
            symbol: p.symbol,
            position_amt,
        });
    }
    Ok(out)
}

fn parse_income(raw: Vec<IncomeRecord>) -> Result<Vec<FundingIncome>, ExchangeError> {
    raw.into_iter()
        .map(|r| {
            let time = DateTime::from_timestamp_millis(r.time)
                .ok_or_else(|| ExchangeError::Parse(format!("invalid income time {}", r.time)))?;
            Ok(FundingIncome {
                income: parse_num(&r.income)?,
                symbol: r.symbol,
                time,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usdt_balance_defaults_to_zero() {
        let balances: Vec<FuturesBalance> = serde_json::from_str(
            r#"[
                {"accountAlias": "x", "asset": "BNB", "balance": "1.5"},
                {"accountAlias": "x", "asset": "USDT", "balance": "123.45"}
            ]"#,
        )
        .unwrap();
        assert_eq!(usdt_balance(&balances).unwrap(), 123.45);
        assert_eq!(usdt_balance(&balances[..1]).unwrap(), 0.0);
    }

    #[test]
    fn open_positions_drop_flat_entries() {
        let raw: Vec<PositionRisk> = serde_json::from_str(
            r#"[
                {"symbol": "AUSDT", "positionAmt": "0.000", "entryPrice": "0.0", "positionSide": "BOTH"},
                {"symbol": "BUSDT", "positionAmt": "2.647", "entryPrice": "37.78", "positionSide": "BOTH"}
            ]"#,
        )
        .unwrap();
        let positions = parse_open_positions(raw).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "BUSDT");
        assert_eq!(positions[0].position_amt, 2.647);
    }

    #[test]
    fn income_records_parse() {
        let raw: Vec<IncomeRecord> = serde_json::from_str(
            r#"[
                {"symbol": "AUSDT", "incomeType": "FUNDING_FEE", "income": "0.40000000", "asset": "USDT", "time": 1700006400000, "tranId": 1},
                {"symbol": "BUSDT", "incomeType": "FUNDING_FEE", "income": "-0.01000000", "asset": "USDT", "time": 1700020800000, "tranId": 2}
            ]"#,
        )
        .unwrap();
        let income = parse_income(raw).unwrap();
        assert_eq!(income.len(), 2);
        assert_eq!(income[0].income, 0.4);
        assert_eq!(income[1].time.timestamp_millis(), 1700020800000);
    }
}
