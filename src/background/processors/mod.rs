//! Processors module - domain-specific processing logic
//!
//! This module contains the following submodules:
//! - `filter`: Filter engine entry point (decode, transform, write back)
//! - `canny`: Edge detection used by the canny filter
//! - `setup`: Initialization setup (folder creation, logger)

pub mod canny;
pub mod filter;
pub mod setup;
