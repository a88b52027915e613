//! Market-facing value types shared by every engine component

pub mod types;

pub use types::{PriceMap, Side, Symbol};
