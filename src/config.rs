//! Process configuration (§6, ambient addendum in SPEC_FULL.md §6):
//! environment-variable driven, parsed once at process start into a
//! validated `Config`, following the teacher's "raw struct with `Option`
//! fields, defaults applied once" pattern (`RawConfig`/`NestedRawConfig` in
//! `crates/agentgateway/src/lib.rs`) rather than re-reading the environment
//! at call sites.

use std::env::VarError;
use std::time::Duration;

use secrecy::SecretString;

use crate::backend::azure::AzureConfig;
use crate::backend::bedrock::BedrockConfig;
use crate::error::GatewayError;
use crate::resilience::breaker::BreakerConfig;
use crate::strng::{self, Strng};

fn env_var(key: &str) -> Option<String> {
	match std::env::var(key) {
		Ok(v) if !v.is_empty() => Some(v),
		Ok(_) | Err(VarError::NotPresent) => None,
		Err(VarError::NotUnicode(_)) => None,
	}
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
	env_var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
	Text,
	Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
	pub env_filter: Strng,
	pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ConversationConfig {
	pub max_age: Duration,
	pub cleanup_interval: Duration,
	pub max_stored_conversations: usize,
}

/// The validated, process-wide configuration. Built once by `Config::load`;
/// every component receives its slice of this value rather than reading the
/// environment itself.
pub struct Config {
	pub bind_addr: Strng,
	pub request_body_limit_bytes: usize,
	pub logging: LoggingConfig,
	pub conversation: ConversationConfig,
	pub breaker: BreakerConfig,
	pub content_security_validation_enabled: bool,
	/// §7: the Graceful-Degradation Hook is a policy hook, off by default.
	pub graceful_degradation_enabled: bool,
	pub azure: Option<AzureConfig>,
	pub bedrock: Option<BedrockConfig>,
}

impl Config {
	/// Reads environment variables once, applies defaults, and validates any
	/// backend sections that are present. At least one of Azure or Bedrock
	/// must be configured, or the Model Router has nothing to route to.
	pub fn load() -> Result<Self, GatewayError> {
		let logging = LoggingConfig {
			env_filter: strng::new(env_var("RUST_LOG").unwrap_or_else(|| "info".to_string())),
			format: match env_var("LOG_FORMAT").as_deref() {
				Some("json") => LogFormat::Json,
				_ => LogFormat::Text,
			},
		};

		let conversation = ConversationConfig {
			max_age: Duration::from_millis(parse_env("CONVERSATION_MAX_AGE_MS", 3_600_000u64)),
			cleanup_interval: Duration::from_millis(parse_env("CONVERSATION_CLEANUP_INTERVAL_MS", 300_000u64)),
			max_stored_conversations: parse_env("MAX_STORED_CONVERSATIONS", 1000usize),
		};

		let breaker = BreakerConfig {
			failure_threshold: parse_env("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5u32),
			recovery_timeout: Duration::from_millis(parse_env("RECOVERY_TIMEOUT_MS", 60_000u64)),
		};

		let azure = load_azure()?;
		let bedrock = load_bedrock()?;
		if azure.is_none() && bedrock.is_none() {
			return Err(GatewayError::validation("backends", "at least one of Azure or Bedrock must be configured"));
		}

		Ok(Config {
			bind_addr: strng::new(env_var("GATEWAY_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string())),
			request_body_limit_bytes: parse_env("REQUEST_BODY_LIMIT_BYTES", 10_485_760usize),
			logging,
			conversation,
			breaker,
			content_security_validation_enabled: parse_env("ENABLE_CONTENT_SECURITY_VALIDATION", true),
			graceful_degradation_enabled: parse_env("ENABLE_GRACEFUL_DEGRADATION", false),
			azure,
			bedrock,
		})
	}
}

fn load_azure() -> Result<Option<AzureConfig>, GatewayError> {
	let host = env_var("AZURE_OPENAI_ENDPOINT").or_else(|| env_var("BASE_URL"));
	let api_key = env_var("AZURE_OPENAI_API_KEY");
	let (Some(host), Some(api_key)) = (host, api_key) else {
		return Ok(None);
	};
	let config = AzureConfig {
		host: strng::new(host),
		api_key: SecretString::from(api_key),
		model_deployment: env_var("AZURE_OPENAI_MODEL").map(strng::new),
		api_version: strng::new(env_var("AZURE_OPENAI_API_VERSION").unwrap_or_else(|| "2024-08-01-preview".to_string())),
		timeout: Duration::from_millis(parse_env("AZURE_OPENAI_TIMEOUT", 120_000u64)),
		max_retries: parse_env("AZURE_OPENAI_MAX_RETRIES", 3u32),
	};
	config.validate()?;
	Ok(Some(config))
}

fn load_bedrock() -> Result<Option<BedrockConfig>, GatewayError> {
	let region = env_var("AWS_BEDROCK_REGION");
	let bearer_token = env_var("AWS_BEDROCK_BEARER_TOKEN");
	let (Some(region), Some(bearer_token)) = (region, bearer_token) else {
		return Ok(None);
	};
	let config = BedrockConfig {
		region: strng::new(region),
		bearer_token: SecretString::from(bearer_token),
		model_override: env_var("AWS_BEDROCK_MODEL").map(strng::new),
		timeout: Duration::from_millis(parse_env("AWS_BEDROCK_TIMEOUT", 120_000u64)),
		max_retries: parse_env("AWS_BEDROCK_MAX_RETRIES", 3u32),
	};
	config.validate()?;
	Ok(Some(config))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_env_falls_back_to_default_on_missing_or_invalid() {
		std::env::remove_var("LLM_GATEWAY_TEST_UNSET");
		assert_eq!(parse_env::<u32>("LLM_GATEWAY_TEST_UNSET", 42), 42);
	}
}
