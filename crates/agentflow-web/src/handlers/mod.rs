//! HTTP handlers for all web routes.

pub mod agents;
pub mod slr;
pub mod system;
