pub mod app;
pub mod config;
pub mod domain;
pub mod entities;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod http;
pub mod interactions;
pub mod limiter;
pub mod mygene;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod retry;
pub mod store;
pub mod validate;
