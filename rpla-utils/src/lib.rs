//! Utility library for the RPL attacks framework

pub mod fs_utils;
pub mod other;
pub mod process;
