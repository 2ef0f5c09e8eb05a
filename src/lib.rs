pub mod cache;
pub mod calls;
pub mod checker;
pub mod config;
pub mod currency;
pub mod error;
pub mod metrics;
pub mod network;
pub mod notify;
pub mod parser;
pub mod provider;
pub mod query;
pub mod repository;
pub mod scanner;
pub mod units;
