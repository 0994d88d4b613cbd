pub mod cancel;
pub mod catalog;
pub mod config;
pub mod deriver;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod output;
pub mod populate;
pub mod resolver;
pub mod store;
