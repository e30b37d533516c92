use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::CatalogEntry;

pub const CONVERTER_MODULE: &str = "mediapipe.tasks.python.genai.converter";
pub const BUNDLER_MODULE: &str = "mediapipe.tasks.python.genai.bundler";
pub const TFLITE_MODEL_FILE: &str = "model.tflite";
pub const TOKENIZER_MODEL_FILE: &str = "tokenizer.model";
pub const START_TOKEN: &str = "<bos>";
pub const STOP_TOKEN: &str = "<eos>";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Quantization {
    #[default]
    DynamicInt4,
    DynamicInt8,
    Float16,
    Float32,
}

impl Quantization {
    pub fn as_str(self) -> &'static str {
        match self {
            Quantization::DynamicInt4 => "dynamic_int4",
            Quantization::DynamicInt8 => "dynamic_int8",
            Quantization::Float16 => "float16",
            Quantization::Float32 => "float32",
        }
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Python string literal; JSON escapes are a subset of Python's.
fn py_str(value: impl fmt::Display) -> String {
    Value::String(value.to_string()).to_string()
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Inputs of the converter library's `ConversionConfig`. The converter exports a
/// `.tflite` model that the bundler packs afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub quantization: Quantization,
}

impl ConversionConfig {
    /// Script that builds the config object and runs `convert(config)`.
    pub fn python_script(&self, module: &str) -> String {
        format!(
            "import {module} as converter
quantization = getattr(converter, \"QuantizationConfig\", None)
config = converter.ConversionConfig(
    input_path={input},
    output_path={output},
    quantization_config=getattr(quantization, {mode})() if quantization else {mode},
)
converter.convert(config)
",
            input = py_str(self.input_path.display()),
            output = py_str(self.output_path.display()),
            mode = py_str(self.quantization),
        )
    }
}

/// Inputs of the bundler library's `BundleConfig`, which packs an exported model
/// and its tokenizer into a single bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    pub tflite_model: PathBuf,
    pub tokenizer_model: PathBuf,
    pub start_token: String,
    pub stop_tokens: Vec<String>,
    pub output_filename: PathBuf,
    pub enable_bytes_to_unicode_mapping: bool,
}

impl BundleConfig {
    /// Script that builds the config object and runs `create_bundle(config)`.
    pub fn python_script(&self, module: &str) -> String {
        let stop_tokens: Vec<String> = self.stop_tokens.iter().map(py_str).collect();
        format!(
            "import {module} as bundler
config = bundler.BundleConfig(
    tflite_model={tflite},
    tokenizer_model={tokenizer},
    start_token={start},
    stop_tokens=[{stop}],
    output_filename={output},
    enable_bytes_to_unicode_mapping={mapping},
)
bundler.create_bundle(config)
",
            tflite = py_str(self.tflite_model.display()),
            tokenizer = py_str(self.tokenizer_model.display()),
            start = py_str(&self.start_token),
            stop = stop_tokens.join(", "),
            output = py_str(self.output_filename.display()),
            mapping = py_bool(self.enable_bytes_to_unicode_mapping),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub model_id: String,
    pub model_name: String,
    pub repo: String,
    pub checkpoint_dir: PathBuf,
    pub output_path: PathBuf,
    pub conversion: ConversionConfig,
    pub bundle: BundleConfig,
}

impl ConversionJob {
    /// The converter exports `<output stem>.tflite` next to the bundle; a `model.tflite`
    /// already present in the snapshot is bundled as-is.
    pub fn new(entry: &CatalogEntry, checkpoint_dir: &Path, output_path: &Path) -> Self {
        let exported = output_path.with_extension("tflite");
        let shipped = checkpoint_dir.join(TFLITE_MODEL_FILE);
        let tflite_model = if shipped.is_file() {
            shipped
        } else {
            exported.clone()
        };
        Self {
            model_id: entry.id.clone(),
            model_name: entry.name.clone(),
            repo: entry.source.location().to_string(),
            checkpoint_dir: checkpoint_dir.to_path_buf(),
            output_path: output_path.to_path_buf(),
            conversion: ConversionConfig {
                input_path: checkpoint_dir.to_path_buf(),
                output_path: exported,
                quantization: entry.quantization(),
            },
            bundle: BundleConfig {
                tflite_model,
                tokenizer_model: checkpoint_dir.join(TOKENIZER_MODEL_FILE),
                start_token: START_TOKEN.into(),
                stop_tokens: vec![STOP_TOKEN.into()],
                output_filename: output_path.to_path_buf(),
                enable_bytes_to_unicode_mapping: true,
            },
        }
    }

    /// Sidecar written when no backend could produce the bundle.
    pub fn instructions_path(&self) -> PathBuf {
        let stem = self
            .output_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.model_id.clone());
        self.output_path
            .with_file_name(format!("{stem}_conversion_info.txt"))
    }
}
