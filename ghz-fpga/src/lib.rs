#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::unescaped_backticks)]

//! Pipelined execution of sequences on daisy-chained GHz FPGA DAC/ADC boards.

/// Board group and server configuration.
pub mod config;
/// Per-client sequence settings.
pub mod context;
/// Error types.
pub mod error;
/// Board groups and the run pipeline.
pub mod group;
/// Transports.
pub mod link;
/// Common imports.
pub mod prelude;
/// The server and sequence scheduling.
pub mod server;
/// External setup actions.
pub mod setup;

pub use ghz_fpga_driver as driver;

pub use group::BoardGroup;
pub use server::FpgaServer;
