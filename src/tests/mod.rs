//! Cross-module test suites. Leaf-level behavior is tested inline next to
//! each module; these cover the scenarios that span subsystems.

pub mod common;

mod context_test;
mod lineage_test;
mod service_test;
mod sqlite_adapter_test;
mod state_test;
