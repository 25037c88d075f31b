pub mod app;
pub mod chat;
pub mod config;
pub mod controls;
pub mod errors;
pub mod events;
pub mod export;
pub mod llm;
pub mod logging;
pub mod message;
pub mod relay;
pub mod streaming;
pub mod tui;
pub mod ui;
