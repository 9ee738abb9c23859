//! Evaluator tests
//!
//! Organized by feature area

mod class_tests;
mod helpers;
