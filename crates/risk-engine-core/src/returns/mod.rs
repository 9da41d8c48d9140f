pub mod provider;
pub mod series;

pub use provider::{InMemoryMarketData, MarketDataProvider, PriceHistory, PricePoint};
pub use series::{ReturnMatrix, ReturnSeriesBuilder};
