//! Pricing engine: pure totals computation over an order and its lines, plus
//! the line price cache that freezes per-line net prices against later rate
//! and VAT changes.

pub mod cache;
pub mod rate;
pub mod totals;

pub use cache::{recompute_original_net_price, save_basket_prices};
pub use rate::{FixedRate, RateProvider, RateTable};
pub use totals::{compute_totals, Totals};
