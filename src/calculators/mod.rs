//! Calculators: spread, executable price, and depth (spec.md §4.4).

pub mod depth;
pub mod executable_price;
pub mod spread;
