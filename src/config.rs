use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// lcaudit: runs collectors, analysers and synthesis over a website and
/// serves the resulting audit reports.
#[derive(Parser, Debug, Clone)]
#[command(name = "lcaudit")]
pub struct CliArgs {
    /// HTTP port
    #[arg(long = "port", env = "LCAUDIT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory for stored reports, screenshots and the history database
    #[arg(short = 'd', long = "data-dir", env = "LCAUDIT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Also write daily-rolling log files into this directory
    #[arg(short = 'l', long = "log-dir", env = "LCAUDIT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Base URL stored screenshots and reports are served from. Vision
    /// providers fetch screenshots through it, so it must be reachable from
    /// outside in production.
    #[arg(long = "public-url", env = "LCAUDIT_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Per-collector timeout in seconds
    #[arg(long = "collector-timeout", default_value_t = COLLECTOR_TIMEOUT_SECS)]
    pub collector_timeout_secs: u64,

    /// Per-analyser timeout in seconds
    #[arg(long = "analyser-timeout", default_value_t = ANALYSER_TIMEOUT_SECS)]
    pub analyser_timeout_secs: u64,

    /// Max audit requests per client within the rate-limit window
    #[arg(long = "rate-limit-max", default_value_t = RATE_LIMIT_MAX_REQUESTS)]
    pub rate_limit_max: usize,

    /// Rate-limit window in seconds
    #[arg(long = "rate-limit-window", default_value_t = RATE_LIMIT_WINDOW_SECS)]
    pub rate_limit_window_secs: u64,

    #[arg(long = "gemini-api-key", env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long = "anthropic-api-key", env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(long = "screenshotone-api-key", env = "SCREENSHOTONE_API_KEY", hide_env_values = true)]
    pub screenshotone_api_key: Option<String>,

    #[arg(long = "pagespeed-api-key", env = "PAGESPEED_API_KEY", hide_env_values = true)]
    pub pagespeed_api_key: Option<String>,

    #[arg(long = "google-cse-api-key", env = "GOOGLE_CSE_API_KEY", hide_env_values = true)]
    pub google_cse_api_key: Option<String>,

    #[arg(long = "google-cse-id", env = "GOOGLE_CSE_ID")]
    pub google_cse_id: Option<String>,
}

/// Credentials for the external services. Every field is optional: a missing
/// key makes the matching collector fail or drops the provider from its chain.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub gemini: Option<String>,
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub screenshotone: Option<String>,
    pub pagespeed: Option<String>,
    pub google_cse: Option<(String, String)>,
}

pub struct AuditConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub public_base_url: String,
    pub collector_timeout: Duration,
    pub analyser_timeout: Duration,
    pub audit_budget: Duration,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    pub keys: ApiKeys,
}

pub const DEFAULT_PORT: u16 = 3000;

// Pipeline timing
pub const COLLECTOR_TIMEOUT_SECS: u64 = 120;
pub const ANALYSER_TIMEOUT_SECS: u64 = 120;
pub const AUDIT_MAX_DURATION_SECS: u64 = 300;
pub const PROVIDER_HTTP_TIMEOUT_SECS: u64 = 110;
pub const COLLECTOR_HTTP_TIMEOUT_SECS: u64 = 60;
// Held back from the audit budget: analysers stop this long before it
// runs out, synthesis providers stop `PERSIST_RESERVE_SECS` before it.
pub const SYNTHESIS_RESERVE_SECS: u64 = 20;
pub const PERSIST_RESERVE_SECS: u64 = 5;

// Retry constants for network collectors
pub const FETCH_MAX_ATTEMPTS: u32 = 2;
pub const FETCH_INITIAL_BACKOFF_MS: u64 = 1000;

// Rate limiting
pub const RATE_LIMIT_MAX_REQUESTS: usize = 5;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

// Request limits
pub const MAX_PAGES_PER_REQUEST: usize = 2;

// Log constants
pub const LOG_BUFFER_SIZE: usize = 500;

// Report assembly
pub const MAX_TOP_FIXES: usize = 5;
pub const HISTORY_DEFAULT_LIMIT: usize = 50;
pub const HISTORY_MAX_LIMIT: usize = 200;

// Collector settings
pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; LcauditBot/1.0)";
pub const MAX_INTERNAL_LINKS_TO_CHECK: usize = 50;
pub const MAX_REDIRECTS: usize = 10;
pub const MAX_SITEMAP_SAMPLE_URLS: usize = 10;
pub const SCREENSHOT_DESKTOP: (u32, u32) = (1440, 900);
pub const SCREENSHOT_MOBILE: (u32, u32) = (390, 844);
pub const SCREENSHOT_FULL_PAGE_MAX_HEIGHT: u32 = 5000;

pub const PAGESPEED_API_URL: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";
pub const GOOGLE_CSE_API_URL: &str = "https://www.googleapis.com/customsearch/v1";
pub const SCREENSHOTONE_API_URL: &str = "https://api.screenshotone.com/take";

pub const SECURITY_HEADERS: &[&str] = &[
    "strict-transport-security",
    "content-security-policy",
    "x-frame-options",
    "x-content-type-options",
    "referrer-policy",
    "permissions-policy",
];

// AI model definitions: (provider, key, model_id, display_name)
pub const AI_MODELS: &[(&str, &str, &str, &str)] = &[
    (
        "gemini",
        "flash",
        "gemini-3-flash-preview",
        "Gemini 3 Flash",
    ),
    ("gemini", "pro", "gemini-3-pro-preview", "Gemini 3 Pro"),
    ("openai", "mini", "gpt-4o-mini", "GPT-4o mini"),
    ("openai", "gpt5", "gpt-5", "GPT-5"),
    (
        "anthropic",
        "sonnet",
        "claude-sonnet-4-5-20250929",
        "Claude Sonnet 4.5",
    ),
];

/// Look up the concrete model id for a `(provider, key)` pair.
pub fn resolve_model_id(provider: &str, key: &str) -> Option<&'static str> {
    AI_MODELS
        .iter()
        .find(|(p, k, _, _)| *p == provider && *k == key)
        .map(|(_, _, id, _)| *id)
}

impl AuditConfig {
    pub fn from_args(args: CliArgs) -> Self {
        let data_dir = args.data_dir.unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("lcaudit")
        });

        let google_cse = match (args.google_cse_api_key, args.google_cse_id) {
            (Some(key), Some(id)) if !key.is_empty() && !id.is_empty() => Some((key, id)),
            _ => None,
        };

        let public_base_url = non_empty(args.public_url)
            .unwrap_or_else(|| format!("http://localhost:{}", args.port));

        AuditConfig {
            port: args.port,
            data_dir,
            log_dir: args.log_dir,
            public_base_url,
            collector_timeout: Duration::from_secs(args.collector_timeout_secs),
            analyser_timeout: Duration::from_secs(args.analyser_timeout_secs),
            audit_budget: Duration::from_secs(AUDIT_MAX_DURATION_SECS),
            rate_limit_max: args.rate_limit_max,
            rate_limit_window: Duration::from_secs(args.rate_limit_window_secs),
            keys: ApiKeys {
                gemini: non_empty(args.gemini_api_key),
                openai: non_empty(args.openai_api_key),
                anthropic: non_empty(args.anthropic_api_key),
                screenshotone: non_empty(args.screenshotone_api_key),
                pagespeed: non_empty(args.pagespeed_api_key),
                google_cse,
            },
        }
    }

    /// Names of the credentials that are not configured, for the startup warning.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let k = &self.keys;
        let mut missing = Vec::new();
        if k.gemini.is_none() {
            missing.push("GEMINI_API_KEY");
        }
        if k.openai.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if k.anthropic.is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if k.screenshotone.is_none() {
            missing.push("SCREENSHOTONE_API_KEY");
        }
        if k.pagespeed.is_none() {
            missing.push("PAGESPEED_API_KEY");
        }
        if k.google_cse.is_none() {
            missing.push("GOOGLE_CSE_API_KEY/GOOGLE_CSE_ID");
        }
        missing
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.data_dir.join("audit-history.db")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
