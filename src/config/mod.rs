pub mod settings;

pub use settings::{ConverterSettings, HubSettings, Settings};
