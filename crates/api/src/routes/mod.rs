//! Route handlers

pub mod attempts;
