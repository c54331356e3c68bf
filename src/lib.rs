pub mod archive;
pub mod catalog;
pub mod commands;
pub mod download;
pub mod envcfg;
pub mod error;
pub mod gc;
pub mod http;
pub mod install;
pub mod manager;
pub mod platform;
pub mod runtime;
pub mod settings;
pub mod switch;
