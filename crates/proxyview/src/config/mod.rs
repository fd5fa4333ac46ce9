//! YAML configuration for the proxy view.
//!
//! Camera pipelines are written as templates. After parsing, every
//! `{VAR}` is resolved so the rest of the crate only sees final descriptors.

mod substitution;

pub use substitution::TemplateContext;

use crate::compositor::{CompositorSettings, DEFAULT_BLANK_HEIGHT, DEFAULT_BLANK_WIDTH};
use crate::frame::PixelFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// RTSP credentials and endpoint shared by all camera templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtspConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_rtsp_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub path: String,
    /// Base URL, e.g. `rtsp://{USER}:{PASSWD}@{HOST}:{PORT}{PATH}`
    #[serde(default)]
    pub url: String,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_rtsp_port(),
            user: String::new(),
            password: String::new(),
            path: String::new(),
            url: String::new(),
        }
    }
}

fn default_rtsp_port() -> u16 {
    554
}

/// Placeholder frame used for each camera until it delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlankConfig {
    #[serde(default = "default_blank_width")]
    pub width: u32,
    #[serde(default = "default_blank_height")]
    pub height: u32,
    #[serde(default)]
    pub format: PixelFormat,
}

impl Default for BlankConfig {
    fn default() -> Self {
        Self {
            width: default_blank_width(),
            height: default_blank_height(),
            format: PixelFormat::default(),
        }
    }
}

fn default_blank_width() -> u32 {
    DEFAULT_BLANK_WIDTH
}

fn default_blank_height() -> u32 {
    DEFAULT_BLANK_HEIGHT
}

/// Camera side of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Frames buffered per camera and in the output queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub rtsp: RtspConfig,
    /// Per-camera fragment substituted as `{LOCATION}`
    #[serde(default)]
    pub locations: Vec<String>,
    /// Expanded wherever a pipeline says `{PIPELINE_IDX}`
    #[serde(default)]
    pub pipeline_template: Option<String>,
    /// One capture descriptor per camera. When empty, one
    /// `{PIPELINE_IDX}` pipeline is generated per location.
    #[serde(default)]
    pub pipelines: Vec<String>,
    #[serde(default)]
    pub blank: BlankConfig,
}

fn default_queue_capacity() -> usize {
    1
}

/// Composite side of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Mount point served by the delivery layer
    #[serde(default = "default_output_path")]
    pub path: String,
    /// Delivery pipeline, with `{OUTPUT_WIDTH}` `{OUTPUT_HEIGHT}` `{OUTPUT_FPS}`
    #[serde(default)]
    pub pipeline: Option<String>,
}

fn default_output_path() -> String {
    "/proxy".to_string()
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse, validate and resolve configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        config.resolve()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.input.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "input.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.output.width == 0 || self.output.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "output size must be non-zero, got {}x{}",
                self.output.width, self.output.height
            )));
        }
        if self.output.fps == 0 {
            return Err(ConfigError::ValidationError(
                "output.fps must be at least 1".to_string(),
            ));
        }
        let blank = &self.input.blank;
        if blank.width == 0 || blank.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "input.blank size must be non-zero, got {}x{}",
                blank.width, blank.height
            )));
        }
        if self.input.pipelines.is_empty() && self.input.pipeline_template.is_none() {
            if !self.input.locations.is_empty() {
                return Err(ConfigError::ValidationError(
                    "input.locations given without input.pipeline_template".to_string(),
                ));
            }
            log::warn!("No camera pipelines configured");
        }
        Ok(())
    }

    /// Substitute every template variable in place.
    fn resolve(&mut self) -> Result<(), ConfigError> {
        let rtsp = &self.input.rtsp;
        let mut base = TemplateContext::new()
            .with_var("USER", rtsp.user.as_str())
            .with_var("PASSWD", rtsp.password.as_str())
            .with_var("HOST", rtsp.host.as_str())
            .with_var("PORT", rtsp.port.to_string())
            .with_var("PATH", rtsp.path.as_str());
        let url = base.substitute(&rtsp.url);
        base.set("URL", url.as_str());
        self.input.rtsp.url = url;

        let locations: Vec<String> = self
            .input
            .locations
            .iter()
            .map(|location| base.substitute(location))
            .collect();

        if self.input.pipelines.is_empty() && self.input.pipeline_template.is_some() {
            self.input.pipelines = vec!["{PIPELINE_IDX}".to_string(); locations.len()];
        }

        let template = self.input.pipeline_template.as_deref();
        let mut pipelines = Vec::with_capacity(self.input.pipelines.len());
        for (i, pipeline) in self.input.pipelines.iter().enumerate() {
            let mut ctx = base.clone();
            if let Some(location) = locations.get(i) {
                ctx.set("LOCATION", location.as_str());
                if let Some(template) = template {
                    let expanded = ctx.substitute(template);
                    ctx.set("PIPELINE_IDX", expanded);
                }
            }
            if pipeline.contains("{PIPELINE_IDX}") && ctx.get("PIPELINE_IDX").is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "input.pipelines[{}] uses {{PIPELINE_IDX}} but needs input.pipeline_template \
                     and a matching entry in input.locations ({} given)",
                    i,
                    locations.len()
                )));
            }

            let resolved = ctx.substitute(pipeline);
            for name in ctx.unresolved(&resolved) {
                log::warn!("input.pipelines[{}]: unresolved variable {{{}}}", i, name);
            }
            pipelines.push(resolved);
        }
        self.input.locations = locations;
        self.input.pipelines = pipelines;

        if let Some(pipeline) = &self.output.pipeline {
            let ctx = TemplateContext::new()
                .with_var("OUTPUT_WIDTH", self.output.width.to_string())
                .with_var("OUTPUT_HEIGHT", self.output.height.to_string())
                .with_var("OUTPUT_FPS", self.output.fps.to_string());
            self.output.pipeline = Some(ctx.substitute(pipeline));
        }
        Ok(())
    }

    /// Resolved capture descriptors, one per camera
    pub fn descriptors(&self) -> &[String] {
        &self.input.pipelines
    }

    pub fn compositor_settings(&self) -> CompositorSettings {
        let blank = &self.input.blank;
        CompositorSettings::new(
            self.input.queue_capacity,
            self.output.width,
            self.output.height,
        )
        .with_blank(blank.width, blank.height, blank.format)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
