pub mod app;
pub mod args;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod fs_util;
pub mod hooks;
pub mod installer;
pub mod invoker;
pub mod locator;
pub mod output;
pub mod quiescence;
pub mod tags;
pub mod writer;
