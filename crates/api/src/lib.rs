//! HTTP surface for the billing-period engine.
//!
//! A thin translation layer: routes parse and validate the wire shapes,
//! the dispatcher does everything else.

pub mod app;
pub mod config;
