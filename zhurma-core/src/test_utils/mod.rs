// File: zhurma-core/src/test_utils/mod.rs
//
// Fakes and fixtures shared by unit and integration tests.

pub mod helpers;

pub use helpers::*;
