pub mod names;
pub mod protocol;
pub mod types;
