//! depbot-lib: dependency build orchestration
//!
//! This crate provides the pieces the `depbot` CLI drives:
//! - `schedule`: runs build tasks once each, in dependency order
//! - `tools`: finds or downloads integrity-verified tool archives
//! - `prepare`: splits a source checkout into per-architecture copies
//! - `matrix`: drives a build across configuration x architecture cells
//! - `process`: runs external programs with an explicit environment and timeout

pub mod config;
pub mod consts;
pub mod env;
pub mod lock;
pub mod matrix;
pub mod platform;
pub mod prepare;
pub mod process;
pub mod schedule;
pub mod target;
pub mod task;
pub mod toolchain;
pub mod tools;
pub mod util;
