//! Safety Validator (spec.md §4.6).

pub mod validator;

pub use validator::{net_spread_floor, suggested_position_usd, SafetyValidator};
