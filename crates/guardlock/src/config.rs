use std::error::Error;
use std::fmt;

pub const ENV_CAPTURE_STACK: &str = "GUARDLOCK_CAPTURE_STACK";
pub const ENV_MAX_FRAMES: &str = "GUARDLOCK_MAX_FRAMES";

const DEFAULT_MAX_FRAMES: usize = 64;

/// Product branding stamped into diagnostic events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub name: String,
    pub version: String,
    pub report_email: Option<String>,
}

impl ProductInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            report_email: None,
        }
    }

    pub fn with_report_email(mut self, email: impl Into<String>) -> Self {
        self.report_email = Some(email.into());
        self
    }

    /// `Name-1.2.3`
    pub fn version_short(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// `Name-1.2.3 (Name)`
    pub fn full_version(&self) -> String {
        format!("{} ({})", self.version_short(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Capture and log a stack dump for each violation. Without it the caller
    /// name cannot be resolved either.
    pub capture_stack: bool,
    /// Upper bound on frames kept in a rendered stack dump.
    pub max_frames: usize,
    pub product: Option<ProductInfo>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            capture_stack: true,
            max_frames: DEFAULT_MAX_FRAMES,
            product: None,
        }
    }
}

impl GuardConfig {
    /// Defaults overridden by `GUARDLOCK_CAPTURE_STACK` and
    /// `GUARDLOCK_MAX_FRAMES`. Unset variables keep their default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CAPTURE_STACK) {
            config.capture_stack = parse_bool(ENV_CAPTURE_STACK, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_FRAMES) {
            config.max_frames = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_MAX_FRAMES,
                        value: raw,
                        expected: "a positive integer",
                    });
                }
            };
        }
        Ok(config)
    }

    pub fn with_product(mut self, product: ProductInfo) -> Self {
        self.product = Some(product);
        self
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_owned(),
            expected: "one of 1/true/on/yes or 0/false/off/no",
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "invalid {key}={value:?}: expected {expected}"),
        }
    }
}

impl Error for ConfigError {}
