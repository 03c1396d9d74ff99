// Codec configuration, passed explicitly into every builder
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::model::rate::RatePlanOperation;
use crate::validation::linked_rate::LinkedRateMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub endpoint: HubEndpoint,
    pub target: TargetEnvironment,
    pub version: String,
    pub pretty_print: bool,
    // Format accepted for dates handed to the builders as text.
    pub date_format: String,
    pub hotel_code: CodeRule,
    pub room_type_code: CodeRule,
    pub rate_plan_code: CodeRule,
    pub inventory: InventoryLimits,
    pub rate: RateLimits,
    pub default_currency: String,
    pub linked_rate_mode: LinkedRateMode,
    pub retry: RetryConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            endpoint: HubEndpoint::default(),
            target: TargetEnvironment::Test,
            version: "1.0".to_string(),
            pretty_print: false,
            date_format: "%Y-%m-%d".to_string(),
            hotel_code: CodeRule::new("^[A-Za-z0-9_-]+$", 16),
            room_type_code: CodeRule::new("^[A-Za-z0-9_-]+$", 16),
            rate_plan_code: CodeRule::new("^[A-Za-z0-9_-]+$", 32),
            inventory: InventoryLimits::default(),
            rate: RateLimits::default(),
            default_currency: "USD".to_string(),
            linked_rate_mode: LinkedRateMode::SelfManaged,
            retry: RetryConfig::default(),
        }
    }
}

impl CodecConfig {
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        serde_json::from_str(json).map_err(|e| CodecError::Config(e.to_string()))
    }
}

// Where outbound messages go and how we authenticate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubEndpoint {
    pub url: String,
    pub reply_to: String,
    pub username: String,
    pub password: String,
}

impl Default for HubEndpoint {
    fn default() -> Self {
        Self {
            url: "https://hub.example.com/htng/2011B".to_string(),
            reply_to: "http://www.w3.org/2005/08/addressing/anonymous".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetEnvironment {
    Test,
    Production,
}

impl TargetEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetEnvironment::Test => "Test",
            TargetEnvironment::Production => "Production",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRule {
    pub pattern: String,
    pub max_length: usize,
}

impl CodeRule {
    pub fn new(pattern: &str, max_length: usize) -> Self {
        Self {
            pattern: pattern.to_string(),
            max_length,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryLimits {
    pub batch_cap: usize,
    pub max_span_days: i64,
}

impl Default for InventoryLimits {
    fn default() -> Self {
        Self {
            batch_cap: 100,
            max_span_days: 365,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub batch_caps: RateBatchCaps,
    // Upper bound for the date span of one rate message; longer plans are split.
    pub max_days_per_message: i64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            batch_caps: RateBatchCaps::default(),
            max_days_per_message: 90,
        }
    }
}

// Recommended number of rate plans per message, by operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateBatchCaps {
    pub update: usize,
    pub creation: usize,
    pub inactive: usize,
    pub remove_room_types: usize,
    pub full_sync: usize,
    pub delta_update: usize,
}

impl Default for RateBatchCaps {
    fn default() -> Self {
        Self {
            update: 50,
            creation: 20,
            inactive: 100,
            remove_room_types: 50,
            full_sync: 25,
            delta_update: 100,
        }
    }
}

impl RateBatchCaps {
    pub fn cap_for(&self, operation: RatePlanOperation) -> usize {
        match operation {
            RatePlanOperation::Update => self.update,
            RatePlanOperation::Creation => self.creation,
            RatePlanOperation::Inactive => self.inactive,
            RatePlanOperation::RemoveRoomTypes => self.remove_room_types,
            RatePlanOperation::FullSync => self.full_sync,
            RatePlanOperation::DeltaUpdate => self.delta_update,
        }
    }
}

// Retry configuration for the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Hotel,
    RoomType,
    RatePlan,
}

impl CodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            CodeKind::Hotel => "hotel code",
            CodeKind::RoomType => "room type code",
            CodeKind::RatePlan => "rate plan code",
        }
    }
}

// Compiled form of the code patterns in [`CodecConfig`].
#[derive(Debug, Clone)]
pub struct CodeRules {
    hotel: (Regex, usize),
    room_type: (Regex, usize),
    rate_plan: (Regex, usize),
}

impl CodeRules {
    pub fn compile(config: &CodecConfig) -> Result<Self, CodecError> {
        Ok(Self {
            hotel: (Regex::new(&config.hotel_code.pattern)?, config.hotel_code.max_length),
            room_type: (
                Regex::new(&config.room_type_code.pattern)?,
                config.room_type_code.max_length,
            ),
            rate_plan: (
                Regex::new(&config.rate_plan_code.pattern)?,
                config.rate_plan_code.max_length,
            ),
        })
    }

    // Returns a human readable reason when `code` does not satisfy the rule for `kind`.
    pub fn check(&self, kind: CodeKind, code: &str) -> Result<(), String> {
        let (pattern, max_length) = match kind {
            CodeKind::Hotel => &self.hotel,
            CodeKind::RoomType => &self.room_type,
            CodeKind::RatePlan => &self.rate_plan,
        };

        if code.is_empty() {
            return Err(format!("{} is empty", kind.label()));
        }
        if code.chars().count() > *max_length {
            return Err(format!(
                "{} '{}' exceeds {} characters",
                kind.label(),
                code,
                max_length
            ));
        }
        if !pattern.is_match(code) {
            return Err(format!(
                "{} '{}' does not match pattern {}",
                kind.label(),
                code,
                pattern.as_str()
            ));
        }
        Ok(())
    }
}
