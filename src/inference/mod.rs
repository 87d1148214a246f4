pub mod client;
pub mod gateway;

pub use client::InferenceClient;
pub use gateway::{Completion, InferenceGateway, Prompt, ProviderError};

#[cfg(test)]
pub(crate) mod testing;
