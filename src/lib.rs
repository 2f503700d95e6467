pub mod aggregate;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod exit;
pub mod logs;
pub mod permissions;
pub mod platform;
pub mod rules;
pub mod scope;
pub mod score;
pub mod ui;
