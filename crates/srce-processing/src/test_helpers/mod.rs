//! Test doubles for the processing layer

mod fake_toolkit;

pub use fake_toolkit::{FakeCall, FakeToolkit};
