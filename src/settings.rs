// src/settings.rs

use std::path::{Path, PathBuf};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ENV_PREFIX: &str = "ADAPTIVE_RAG";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Answer questions from a knowledge base, the web, or both"
)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, long, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Image to describe and use as the question.
    #[arg(long, value_name = "IMAGE_PATH")]
    pub image: Option<PathBuf>,

    /// Print the effective settings and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Ask a single question instead of starting an interactive session.
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    /// Scores below this send the query to the web.
    pub lower_threshold: f32,
    /// Scores at or above this answer from the knowledge base alone.
    pub upper_threshold: f32,
    /// Number of documents requested from the index.
    pub top_k: usize,
    /// Generation model used for every judgment and answer.
    pub model: String,
    /// Grade several knowledge-base answers and keep the best one.
    pub self_assessment: bool,
    /// Length of the content preview reported for relevant documents.
    pub preview_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            lower_threshold: 0.3,
            upper_threshold: 0.7,
            top_k: 3,
            model: "llama3.1:8b".to_string(),
            self_assessment: true,
            preview_chars: 200,
        }
    }
}

impl PipelineSettings {
    /// Checks that the thresholds partition `[0, 1]` into three bands and that
    /// at least one document is requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.lower_threshold) || !in_unit(self.upper_threshold) {
            return Err(Error::Config(format!(
                "thresholds must lie in [0, 1] (lower = {}, upper = {})",
                self.lower_threshold, self.upper_threshold
            )));
        }
        if self.lower_threshold >= self.upper_threshold {
            return Err(Error::Config(format!(
                "lower_threshold ({}) must be less than upper_threshold ({})",
                self.lower_threshold, self.upper_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(Error::Config("top_k must be greater than zero".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    pub url: String,
    pub embedding_model: String,
    pub caption_model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    pub qdrant_url: String,
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    pub searxng_url: String,
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub pipeline: PipelineSettings,
    pub ollama: OllamaSettings,
    pub index: IndexSettings,
    pub search: SearchSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    ///
    /// Without an explicit path the per-user config file is used when it
    /// exists. `ADAPTIVE_RAG__<SECTION>__<KEY>` environment variables
    /// override both.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let pipeline = PipelineSettings::default();
        let mut builder = ConfigBuilder::<DefaultState>::default()
            .set_default(
                "pipeline.lower_threshold",
                f64::from(pipeline.lower_threshold),
            )?
            .set_default(
                "pipeline.upper_threshold",
                f64::from(pipeline.upper_threshold),
            )?
            .set_default("pipeline.top_k", pipeline.top_k as u64)?
            .set_default("pipeline.model", pipeline.model)?
            .set_default("pipeline.self_assessment", pipeline.self_assessment)?
            .set_default("pipeline.preview_chars", pipeline.preview_chars as u64)?
            .set_default("ollama.url", "http://127.0.0.1:11434")?
            .set_default("ollama.embedding_model", "nomic-embed-text")?
            .set_default("ollama.caption_model", "llava:7b")?
            .set_default("ollama.temperature", 0.0)?
            .set_default("index.qdrant_url", "http://localhost:6334")?
            .set_default("index.collection", "knowledge_base")?
            .set_default("search.searxng_url", "http://127.0.0.1:8888")?
            .set_default("search.max_results", 5)?
            .set_default("log.level", "info")?;

        match path {
            Some(path) => builder = builder.add_source(File::from(path)),
            None => {
                if let Some(default_path) = default_config_path() {
                    builder = builder.add_source(File::from(default_path).required(false));
                }
            }
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }

    /// Validates every section that carries invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a section is inconsistent.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.search.max_results == 0 {
            return Err(Error::Config("search.max_results must be greater than zero".to_string()));
        }
        if self.log.level.parse::<tracing::Level>().is_err() {
            return Err(Error::Config(format!("unknown log level '{}'", self.log.level)));
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "adaptive-rag").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};

    use tempfile::Builder;

    use super::*;

    // Environment variables are process-wide; tests that load settings hold this.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let file = write_config(
            r#"
            [pipeline]
            top_k = 5
            "#,
        );
        let settings = {
            let _env = env_lock();
            Settings::load(Some(file.path())).unwrap()
        };

        assert_eq!(settings.pipeline.top_k, 5);
        assert!((settings.pipeline.lower_threshold - 0.3).abs() < f32::EPSILON);
        assert!((settings.pipeline.upper_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.index.collection, "knowledge_base");
        assert_eq!(settings.search.max_results, 5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            r#"
            [pipeline]
            lower_threshold = 0.2
            upper_threshold = 0.8
            model = "qwen3:8b"
            self_assessment = false

            [search]
            searxng_url = "http://search.internal"
            "#,
        );
        let settings = {
            let _env = env_lock();
            Settings::load(Some(file.path())).unwrap()
        };

        assert!((settings.pipeline.lower_threshold - 0.2).abs() < f32::EPSILON);
        assert_eq!(settings.pipeline.model, "qwen3:8b");
        assert!(!settings.pipeline.self_assessment);
        assert_eq!(settings.search.searxng_url, "http://search.internal");
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let pipeline = PipelineSettings {
            lower_threshold: 0.7,
            upper_threshold: 0.3,
            ..PipelineSettings::default()
        };
        assert!(matches!(pipeline.validate(), Err(Error::Config(_))));

        let equal = PipelineSettings {
            lower_threshold: 0.5,
            upper_threshold: 0.5,
            ..PipelineSettings::default()
        };
        assert!(equal.validate().is_err());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let above_one = PipelineSettings {
            upper_threshold: 1.5,
            ..PipelineSettings::default()
        };
        assert!(above_one.validate().is_err());

        let no_docs = PipelineSettings {
            top_k: 0,
            ..PipelineSettings::default()
        };
        assert!(no_docs.validate().is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let file = write_config(
            r#"
            [log]
            level = "loud"
            "#,
        );
        let settings = {
            let _env = env_lock();
            Settings::load(Some(file.path())).unwrap()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn environment_overrides_the_file() {
        let file = write_config(
            r#"
            [pipeline]
            top_k = 2

            [index]
            collection = "from_file"
            "#,
        );
        let loaded = {
            let _env = env_lock();
            std::env::set_var("ADAPTIVE_RAG__PIPELINE__TOP_K", "7");
            std::env::set_var("ADAPTIVE_RAG__INDEX__COLLECTION", "docs");
            let loaded = Settings::load(Some(file.path()));
            std::env::remove_var("ADAPTIVE_RAG__PIPELINE__TOP_K");
            std::env::remove_var("ADAPTIVE_RAG__INDEX__COLLECTION");
            loaded
        };
        let settings = loaded.unwrap();

        assert_eq!(settings.pipeline.top_k, 7);
        assert_eq!(settings.index.collection, "docs");
        assert_eq!(settings.search.max_results, 5);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let _env = env_lock();
        assert!(Settings::load(Some(Path::new("/nonexistent/adaptive-rag.toml"))).is_err());
    }
}
