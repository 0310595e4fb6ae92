pub mod app;
pub mod arxiv;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod output;
pub mod status;
pub mod transport;
