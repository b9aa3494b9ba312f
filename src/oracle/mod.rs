pub mod source;
pub mod chainlink;
pub mod uniswap;
pub mod pyth;
pub mod binance;
pub mod coingecko;
pub mod consensus;

pub use source::{OraclePrice, OracleSource};
pub use chainlink::ChainlinkSource;
pub use uniswap::UniswapPoolSource;
pub use pyth::PythSource;
pub use binance::BinanceSource;
pub use coingecko::CoinGeckoSource;
pub use consensus::{PriceConsensusService, PriceOptions, PriceUpdate};
