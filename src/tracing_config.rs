//! Tracing configuration module for structured logging and observability
//!
//! Applications configure subscribers while the library only emits events.
//! Every subscriber installed here writes to stderr so that stdout carries
//! nothing but the result document.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output for CI environments
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set session ID for request correlation
    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",  // Default: only degradations and failures
            1 => "info",  // -v: pipeline decisions
            2 => "debug", // -vv: internal state and computations
            _ => "trace", // -vvv+: extremely detailed traces
        }
    }

    /// Initialize the global subscriber, writing to stderr
    ///
    /// # Errors
    /// Fails on an invalid filter or when a global subscriber is already set.
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = if let Some(env_filter) = &self.env_filter {
            EnvFilter::try_new(env_filter)?
        } else {
            EnvFilter::try_new(self.verbosity_to_filter())?
        };

        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Garment segmentation session started");
        }
        Ok(())
    }
}

/// Convenience function to initialize tracing with CLI-friendly defaults
///
/// # Errors
/// See [`TracingConfig::init`].
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().to_string();
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id.clone())
        .init()?;
    Ok(session_id)
}

/// Span creation helpers for the pipeline stages
pub mod spans {
    use tracing::{Level, Span};

    /// Span for one CLI invocation
    pub fn session(session_id: &str) -> Span {
        tracing::span!(Level::INFO, "session", session_id = %session_id)
    }

    /// Span for processing one input
    pub fn file_processing(source: &str) -> Span {
        tracing::span!(Level::INFO, "file_processing", source = %source)
    }

    /// Span for one segmenter attempt
    pub fn segmentation(method: &str, dimensions: (u32, u32)) -> Span {
        tracing::span!(
            Level::INFO,
            "segmentation",
            method = %method,
            width = %dimensions.0,
            height = %dimensions.1
        )
    }

    /// Span for the color analysis stage
    pub fn color_analysis(mask_area: u64) -> Span {
        tracing::span!(Level::DEBUG, "color_analysis", mask_area = %mask_area)
    }

    /// Span for writing output artifacts
    pub fn postprocessing(operation: &str) -> Span {
        tracing::span!(Level::DEBUG, "postprocessing", operation = %operation)
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use crate::types::ColorAnalysis;
    use tracing::{debug, info, warn};

    /// The learned path was not used; `reason` says why
    pub fn fallback(reason: &dyn std::fmt::Display) {
        info!(reason = %reason, "Learned segmenter unavailable, using heuristic segmenter");
    }

    /// A recoverable stage failure that only degrades the result
    pub fn degraded(stage: &str, error: &dyn std::fmt::Display) {
        warn!(stage = %stage, error = %error, "Stage failed, continuing without it");
    }

    /// Summary of a finished color analysis
    pub fn color_report(analysis: &ColorAnalysis) {
        info!(
            dominant = %analysis.dominant_color.hex(),
            palette = analysis.palette.len(),
            lighter = %analysis.recommended_colors.lighter_shade.hex(),
            darker = %analysis.recommended_colors.darker_shade.hex(),
            complementary = %analysis.recommended_colors.complementary.hex(),
            "Color analysis complete"
        );
    }

    /// Log performance metrics
    pub fn performance_metric(operation: &str, duration_ms: u128) {
        debug!(operation = %operation, duration_ms = %duration_ms, "Performance metric");
    }

    pub fn artifact_written(kind: &str, path: &std::path::Path) {
        debug!(kind = %kind, path = %path.display(), "Artifact written");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "warn");
        assert_eq!(TracingConfig::new().with_verbosity(1).verbosity_to_filter(), "info");
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "debug");
        assert_eq!(TracingConfig::new().with_verbosity(3).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(10).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_env_filter("garment_seg=trace")
            .with_session_id("test-session");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.env_filter.as_deref(), Some("garment_seg=trace"));
        assert_eq!(config.session_id.as_deref(), Some("test-session"));
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.verbosity, 0);
        assert_eq!(config.format, TracingFormat::Console);
        assert!(config.env_filter.is_none());
        assert!(config.session_id.is_none());
    }
}
