//! Built-in strategies.

mod mean_reversion;

pub use mean_reversion::MeanReversionStrategy;
