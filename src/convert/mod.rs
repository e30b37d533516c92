//! Delegated conversion of hub checkpoints into mobile inference bundles.
//!
//! Nothing here touches tensors. The converter library exports a `.tflite` model, the
//! bundler packs it with the tokenizer, and a written manual procedure is the last resort.

mod backend;
mod config;
pub mod manual;
mod pipeline;

pub use backend::{CommandBackend, ConversionBackend, Stage};
pub use config::{
    BundleConfig, ConversionConfig, ConversionJob, Quantization, BUNDLER_MODULE, CONVERTER_MODULE,
};
pub use pipeline::{convert_entry, ConversionOutcome, Converter};

#[cfg(test)]
pub(crate) use backend::tests as backend_tests;
#[cfg(test)]
pub(crate) use pipeline::tests as pipeline_tests;
