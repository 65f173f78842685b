//! Speech synthesis backends

pub mod azure;

pub use azure::AzureSynthesizer;
