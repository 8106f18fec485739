//! Release resolution and installation of JetBrains IDEs
//!
//! The flow is catalog → resolve → download → install, wired together by
//! [`pipeline::Pipeline`] for one [`pipeline::InstallRequest`].

pub mod catalog;
pub mod config;
pub mod desktop;
pub mod download;
pub mod error;
pub mod install;
pub mod pipeline;
pub mod product;
pub mod resolve;

#[cfg(test)]
mod test_support;
