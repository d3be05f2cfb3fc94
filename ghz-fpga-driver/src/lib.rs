#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::unescaped_backticks)]

//! Packet codecs and per-run board runners for GHz FPGA DAC/ADC boards.

/// Board handles.
pub mod board;
/// Error types.
pub mod error;
/// Firmware layouts: build table, registers, jump tables, memory sequences and setup tables.
pub mod firmware;
/// Per-run board runners.
pub mod runner;

pub use ghz_fpga_core as core;
