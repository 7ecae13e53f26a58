#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

/// Vector tile generation
pub mod tiles;
