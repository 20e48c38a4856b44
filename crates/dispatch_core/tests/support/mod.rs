#![allow(dead_code)]

pub mod flow;

pub use dispatch_core::test_helpers::*;
