pub mod error;
pub mod metrics;
pub mod store;
pub mod teams;
pub mod test_utils;
