//! Song tips: the persistent store and the generator that fills it.

mod generator;
mod store;

pub use generator::{
    create_generator, GenerateFuture, LlmTipGenerator, TipGenerator, UnconfiguredGenerator,
};
pub use store::TipStore;
