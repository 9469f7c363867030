//! Reading configurations from files and writing results.

pub use flowsim_utils::*;
