//! Data retrieval and raw-series persistence.
//!
//! Each source client fetches one series at its native frequency over the
//! configured window; the fetch stage writes every series to its own CSV the
//! moment it arrives, so the aggregation stage never touches the network.

pub mod fred;
pub mod shiller;
pub mod store;
pub mod yahoo;

pub use fred::FredClient;
pub use store::{RawSeries, read_series, write_series};
pub use yahoo::YahooClient;
