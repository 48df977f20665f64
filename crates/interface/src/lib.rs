mod error;
mod model;
mod order;

pub use error::ExchangeError;
pub use model::{
    FundingIncome, FundingInterval, FundingRecord, OpenPosition, SymbolRate, SymbolTradingRules,
};
pub use order::{MarketOrder, OrderResponse, OrderSide, StopMarketOrder};
