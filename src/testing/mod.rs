//! Test support
//!
//! Mock transport implementations that let tests script connection attempts,
//! link failures and inbound traffic without a broker.

pub mod mocks;
