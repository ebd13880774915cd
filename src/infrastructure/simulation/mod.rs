pub mod market;
pub mod markets;
pub mod slippage_model;
