//! `providers` crate — HTTP-backed implementations of the `nodes`
//! collaborators: NOAA tide predictions as a `DataSource` and an
//! OpenAI-compatible chat endpoint as an `Oracle`.

pub mod error;
pub mod noaa;
pub mod openai;

pub use error::ProviderError;
pub use noaa::NoaaTides;
pub use openai::{ChatOracle, ChatOracleConfig};
