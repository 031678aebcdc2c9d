//! Application Configuration
//!
//! Loads all environment variables into a typed settings struct.

use anyhow::Result;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Settings for one engine process, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // App
    pub environment: String,
    pub debug: bool,
    pub jwt_secret: String,
    pub bind_addr: String,

    // Payments
    pub payments_api_key: Option<String>,
    pub payments_webhook_secret: String,
    pub payments_base_url: String,

    // LLM
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,

    // Messaging
    pub messaging_account_sid: Option<String>,
    pub messaging_auth_token: Option<String>,
    pub messaging_from_number: String,

    // TTS
    pub tts_api_key: Option<String>,
    pub tts_base_url: String,
    pub tts_voice_en: String,
    pub tts_voice_hi: String,
    pub tts_voice_ml: String,
    pub tts_model: String,

    // Blockchain
    pub chain_rpc_url: Option<String>,
    pub oracle_signing_key: Option<String>,
    pub loan_registry_address: String,
    pub trust_score_address: String,
    pub vouch_bond_address: String,

    // CORS + rate limiting
    pub cors_origins: Vec<String>,
    pub rate_limit_per_minute: u32,

    // Per-request deadline for the agent pipeline
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            environment: env_or("ENVIRONMENT", "development"),
            debug: env_or("DEBUG", "false") == "true",
            jwt_secret: env_or("JWT_SECRET", "change-me-in-production"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8000"),

            payments_api_key: env_opt("PAYMENTS_API_KEY"),
            payments_webhook_secret: env_or("PAYMENTS_WEBHOOK_SECRET", ""),
            payments_base_url: env_or("PAYMENTS_BASE_URL", "https://api.dodopayments.com/v1"),

            llm_api_key: env_opt("LLM_API_KEY"),
            llm_base_url: env_or("LLM_BASE_URL", "https://api.groq.com/openai/v1"),
            llm_model: env_or("LLM_MODEL", "llama-3.3-70b-versatile"),

            messaging_account_sid: env_opt("MESSAGING_ACCOUNT_SID"),
            messaging_auth_token: env_opt("MESSAGING_AUTH_TOKEN"),
            messaging_from_number: env_or("MESSAGING_FROM_NUMBER", ""),

            tts_api_key: env_opt("TTS_API_KEY"),
            tts_base_url: env_or("TTS_BASE_URL", "https://api.elevenlabs.io/v1"),
            tts_voice_en: env_or("TTS_VOICE_EN", "pNInz6obpgDQGcFmaJgB"),
            tts_voice_hi: env_or("TTS_VOICE_HI", "21m00Tcm4TlvDq8ikWAM"),
            tts_voice_ml: env_or("TTS_VOICE_ML", "21m00Tcm4TlvDq8ikWAM"),
            tts_model: env_or("TTS_MODEL", "eleven_multilingual_v2"),

            chain_rpc_url: env_opt("CHAIN_RPC_URL"),
            oracle_signing_key: env_opt("ORACLE_SIGNING_KEY"),
            loan_registry_address: env_or("LOAN_REGISTRY_ADDRESS", ""),
            trust_score_address: env_or("TRUST_SCORE_ADDRESS", ""),
            vouch_bond_address: env_or("VOUCH_BOND_ADDRESS", ""),

            cors_origins: env_or("CORS_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", "60")
                .parse()
                .unwrap_or(60),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", "30").parse().unwrap_or(30),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.rate_limit_per_minute, 60);
        assert!(!config.is_production());
        assert!(!config.cors_origins.is_empty());
    }
}
