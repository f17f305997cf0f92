use std::env;

/// Pipeline configuration for asset promotion and thumbnail rendering
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Key prefix for freshly uploaded objects (default: "staging/")
    pub staging_prefix: String,

    /// Key prefix objects are promoted into (default: "final/")
    pub final_prefix: String,

    /// Thumbnail width in pixels (default: 200)
    pub thumb_width: u32,

    /// Thumbnail height in pixels (default: 200)
    pub thumb_height: u32,

    /// Renderer type: "chromium" or "stub" (default: "chromium")
    pub renderer_type: String,

    /// Per-render timeout in seconds (default: 30)
    pub render_timeout_secs: u64,

    /// Maximum delivery attempts per job (default: 3)
    pub max_attempts: u32,

    /// Base delay for exponential retry backoff, in seconds (default: 10)
    pub backoff_base_secs: u64,

    /// Finished job records retained for inspection (default: 1000)
    pub job_retention: usize,

    /// HTTP listen port (default: 3000)
    pub port: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staging_prefix: "staging/".to_string(),
            final_prefix: "final/".to_string(),
            thumb_width: 200,
            thumb_height: 200,
            renderer_type: "chromium".to_string(),
            render_timeout_secs: 30,
            max_attempts: 3,
            backoff_base_secs: 10,
            job_retention: 1000,
            port: 3000,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            staging_prefix: env::var("STAGING_PREFIX").unwrap_or(default.staging_prefix),

            final_prefix: env::var("FINAL_PREFIX").unwrap_or(default.final_prefix),

            thumb_width: env::var("THUMB_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.thumb_width),

            thumb_height: env::var("THUMB_HEIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.thumb_height),

            renderer_type: env::var("RENDERER_TYPE").unwrap_or(default.renderer_type),

            render_timeout_secs: env::var("RENDER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.render_timeout_secs),

            max_attempts: env::var("JOB_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_attempts),

            backoff_base_secs: env::var("JOB_BACKOFF_BASE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.backoff_base_secs),

            job_retention: env::var("JOB_RETENTION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.job_retention),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
        }
    }

    /// Create config for development (no browser, fast retries)
    pub fn development() -> Self {
        Self {
            renderer_type: "stub".to_string(),
            render_timeout_secs: 5,
            backoff_base_secs: 1,
            ..Self::default()
        }
    }
}
