pub mod adapter;
pub mod btle;
pub mod constants;
pub mod controller;
pub mod machine;
pub mod protocol;
pub mod types;
