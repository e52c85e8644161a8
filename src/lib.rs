pub mod classifier;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fs_util;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod samples;
pub mod staging;
