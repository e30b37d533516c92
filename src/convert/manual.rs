use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::config::{ConversionJob, BUNDLER_MODULE, CONVERTER_MODULE};

pub const LLM_INFERENCE_DOCS: &str =
    "https://ai.google.dev/edge/mediapipe/solutions/genai/llm_inference";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub backend: String,
    pub reason: String,
}

pub fn instructions_text(job: &ConversionJob, attempts: &[Attempt]) -> String {
    let generated = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into());

    let mut text = String::new();
    let _ = writeln!(text, "Model: {}", job.model_name);
    let _ = writeln!(text, "Source: {}", job.repo);
    let _ = writeln!(text, "Downloaded to: {}", job.checkpoint_dir.display());
    let _ = writeln!(text, "Target: {}", job.output_path.display());
    let _ = writeln!(text, "Generated: {generated}");
    let _ = writeln!(text, "Status: Manual conversion required");
    if !attempts.is_empty() {
        let _ = writeln!(text, "Attempts:");
        for attempt in attempts {
            let _ = writeln!(text, "  - {}: {}", attempt.backend, attempt.reason);
        }
    }
    let _ = writeln!(text, "Next steps:");
    let _ = writeln!(text, "1. Install MediaPipe with LLM support: pip install mediapipe");
    let _ = writeln!(text, "2. Export the checkpoint with the converter library:");
    push_indented(&mut text, &job.conversion.python_script(CONVERTER_MODULE));
    let _ = writeln!(text, "3. Bundle the exported model with its tokenizer:");
    push_indented(&mut text, &job.bundle.python_script(BUNDLER_MODULE));
    let _ = writeln!(text, "4. Follow the LLM Inference documentation: {LLM_INFERENCE_DOCS}");
    text
}

fn push_indented(text: &mut String, script: &str) {
    for line in script.lines() {
        let _ = writeln!(text, "   {line}");
    }
}

pub fn write_instructions(job: &ConversionJob, attempts: &[Attempt]) -> Result<PathBuf> {
    let path = job.instructions_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create instructions directory")?;
    }
    fs::write(&path, instructions_text(job, attempts))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

pub fn guide_text() -> String {
    format!(
        "Manual Conversion Guide
=======================
If automatic conversion fails, you can convert manually:

1. Install MediaPipe with LLM support:
   pip install mediapipe

2. Export the checkpoint to a .tflite model with {CONVERTER_MODULE}:
   config = converter.ConversionConfig(
       input_path=\"/path/to/checkpoint\",
       output_path=\"/path/to/model.tflite\",
       quantization_config=converter.QuantizationConfig.dynamic_int4(),
   )
   converter.convert(config)

3. Bundle the exported model with its tokenizer using {BUNDLER_MODULE}:
   config = bundler.BundleConfig(
       tflite_model=\"/path/to/model.tflite\",
       tokenizer_model=\"/path/to/tokenizer.model\",
       start_token=\"<bos>\",
       stop_tokens=[\"<eos>\"],
       output_filename=\"/path/to/output.task\",
       enable_bytes_to_unicode_mapping=True,
   )
   bundler.create_bundle(config)

4. Follow the MediaPipe LLM documentation:
   {LLM_INFERENCE_DOCS}
"
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::models::catalog::tests::hub_entry;

    #[test]
    fn writes_instructions_with_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let job = ConversionJob::new(
            &hub_entry("h1", "org/repo", "h1.task"),
            Path::new("/cache/snapshot"),
            &dir.path().join("models/h1.task"),
        );
        let attempts = vec![Attempt {
            backend: "converter".into(),
            reason: "module missing".into(),
        }];

        let path = write_instructions(&job, &attempts).unwrap();

        assert_eq!(path, dir.path().join("models/h1_conversion_info.txt"));
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("Source: org/repo"));
        assert!(text.contains("Status: Manual conversion required"));
        assert!(text.contains("  - converter: module missing"));
        assert!(text.contains("   import mediapipe.tasks.python.genai.converter as converter"));
        assert!(text.contains("   bundler.create_bundle(config)"));
    }

    #[test]
    fn guide_mentions_both_entry_points() {
        let guide = guide_text();
        assert!(guide.contains("genai.converter"));
        assert!(guide.contains("converter.convert(config)"));
        assert!(guide.contains("bundler.create_bundle(config)"));
    }
}
