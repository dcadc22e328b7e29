//! # Utility Modules
//!
//! - **Logging**: tracing subscriber configuration

pub mod logging;
