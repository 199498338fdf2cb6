//! SWAP math utilities.

pub mod bayes;
pub mod quantile;
pub mod stable;

pub use bayes::*;
pub use quantile::*;
pub use stable::*;
