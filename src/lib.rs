pub mod admin;
pub mod config;
pub mod engine;
pub mod feed;
pub mod pipeline;
pub mod relay;
pub mod render;
pub mod store;
