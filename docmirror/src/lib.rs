pub mod app;
pub mod config;
pub mod oauth_flow;
pub mod report;
pub mod state;
pub mod storage;
pub mod sync;
pub mod token_provider;
