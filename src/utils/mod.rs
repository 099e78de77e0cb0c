//! Cross-cutting helpers.
//!
//! - [`log`]: coloured stderr logging macros (`debug!`, `info!`, `warn!`, `error!`)
//! - [`config`]: INI start-up configuration
//! - [`test_utils`]: fixtures shared by unit tests

pub mod config;
pub mod log;
pub mod test_utils;
