#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::unescaped_backticks)]

//! Core types shared by the GHz FPGA board-group crates.

#[cfg_attr(docsrs, doc(cfg(feature = "board")))]
#[cfg(feature = "board")]
/// Board identity.
pub mod board;
#[cfg_attr(docsrs, doc(cfg(feature = "defined")))]
#[cfg(feature = "defined")]
/// Common constants.
pub mod defined;
#[cfg_attr(docsrs, doc(cfg(feature = "link")))]
#[cfg(feature = "link")]
/// An interface to the direct ethernet transport.
pub mod link;

#[cfg_attr(docsrs, doc(cfg(feature = "link")))]
#[cfg(feature = "link")]
pub use async_trait::async_trait;
