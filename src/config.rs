//! Configuration: layered app config plus env-based voice settings.
//!
//! `AppConfig` covers the process-level knobs (listen address, active
//! telephony provider, timeouts) and loads defaults → optional config file →
//! `BRIDGE_`-prefixed environment → CLI flags. Credentials and per-call
//! defaults live in [`VoiceSettings`], read straight from the environment:
//! a missing credential is a startup *warning*, not a fatal error, so the
//! process keeps serving the endpoints that don't need it.

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::warn;

use crate::negotiator::NegotiatorSettings;
use crate::ultravox::FirstSpeaker;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Telephony provider to serve (twilio | telnyx)
    #[arg(long, env = "TELEPHONY_PROVIDER")]
    pub provider: Option<String>,

    /// Publicly reachable base URL for callbacks
    #[arg(long, env = "EXTERNAL_URL")]
    pub external_url: Option<String>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub resilience: ResilienceConfig,
    pub state: StateConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Base URL the telephony networks can reach this process at; used to
    /// build status-callback and deferred-connect URLs.
    pub external_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelephonyConfig {
    pub provider: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub timeout_disabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    /// Lifetime of unconsumed deferred-connect entries, in seconds.
    pub pending_ttl_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.external_url", "http://localhost:3000")?
            .set_default("telephony.provider", "twilio")?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("state.pending_ttl_secs", 600)?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        }

        // Environment variables prefixed with BRIDGE_, e.g.
        // BRIDGE_SERVER__PORT=8000.
        builder = builder.add_source(
            Environment::with_prefix("BRIDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI flags (and their clap-declared env vars) win over everything.
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(provider) = cli.provider {
            builder = builder.set_override("telephony.provider", provider)?;
        }
        if let Some(external_url) = cli.external_url {
            builder = builder.set_override("server.external_url", external_url)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

/// Twilio credentials.
#[derive(Debug, Clone, Default)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Telnyx credentials.
#[derive(Debug, Clone, Default)]
pub struct TelnyxSettings {
    pub api_key: String,
    pub connection_id: String,
    pub from_number: String,
}

/// Voice-AI backend connection plus per-call defaults, read from env.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub temperature: f64,
    pub inbound_prompt: String,
    pub outbound_prompt: String,
    pub inbound_first_speaker: FirstSpeaker,
    pub outbound_first_speaker: FirstSpeaker,
    pub recording_enabled: bool,
    pub tools_enabled: bool,
    pub default_tools: Option<Vec<String>>,
    pub tool_guidelines: String,
    pub default_corpus: Option<String>,
    pub default_persona: Option<String>,
    pub twilio: TwilioSettings,
    pub telnyx: TelnyxSettings,
}

const DEFAULT_INBOUND_PROMPT: &str = "You are a helpful AI voice assistant answering a phone \
     call. Greet the caller, ask how you can help, and keep your answers short and conversational.";

const DEFAULT_OUTBOUND_PROMPT: &str = "You are a helpful AI voice assistant on an outbound phone \
     call. Wait for the person to speak first, then introduce yourself and explain briefly why \
     you are calling.";

impl VoiceSettings {
    /// Read settings from the process environment. Missing credentials are
    /// logged as warnings and left empty; calls needing them will fail with
    /// a surfaced error rather than preventing startup.
    pub fn load_from_env() -> Self {
        let get = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
        let warn_missing = |key: &str| {
            warn!(key, "credential not set; endpoints requiring it will fail");
            String::new()
        };

        let temperature = get("ULTRAVOX_TEMPERATURE")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.3)
            .clamp(0.0, 1.0);

        let parse_speaker = |key: &str, default: FirstSpeaker| {
            get(key)
                .and_then(|v| {
                    let parsed = FirstSpeaker::parse(&v);
                    if parsed.is_none() {
                        warn!(key, value = %v, "unrecognized first-speaker value, using default");
                    }
                    parsed
                })
                .unwrap_or(default)
        };

        Self {
            base_url: get("ULTRAVOX_BASE_URL")
                .unwrap_or_else(|| "https://api.ultravox.ai".to_string()),
            api_key: get("ULTRAVOX_API_KEY").unwrap_or_else(|| warn_missing("ULTRAVOX_API_KEY")),
            model: get("ULTRAVOX_MODEL").unwrap_or_else(|| "fixie-ai/ultravox".to_string()),
            voice: get("ULTRAVOX_VOICE").unwrap_or_else(|| "Mark".to_string()),
            temperature,
            inbound_prompt: get("INBOUND_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_INBOUND_PROMPT.to_string()),
            outbound_prompt: get("OUTBOUND_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_OUTBOUND_PROMPT.to_string()),
            inbound_first_speaker: parse_speaker("INBOUND_FIRST_SPEAKER", FirstSpeaker::Agent),
            outbound_first_speaker: parse_speaker("OUTBOUND_FIRST_SPEAKER", FirstSpeaker::User),
            recording_enabled: get("RECORDING_ENABLED")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            tools_enabled: get("TOOLS_ENABLED")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            default_tools: get("DEFAULT_TOOLS").map(|raw| {
                raw.split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            }),
            tool_guidelines: get("TOOL_GUIDELINES").unwrap_or_default(),
            default_corpus: get("CORPUS_ID"),
            default_persona: get("AGENT_NAME"),
            twilio: TwilioSettings {
                account_sid: get("TWILIO_ACCOUNT_SID").unwrap_or_default(),
                auth_token: get("TWILIO_AUTH_TOKEN").unwrap_or_default(),
                from_number: get("TWILIO_FROM_NUMBER").unwrap_or_default(),
            },
            telnyx: TelnyxSettings {
                api_key: get("TELNYX_API_KEY").unwrap_or_default(),
                connection_id: get("TELNYX_CONNECTION_ID").unwrap_or_default(),
                from_number: get("TELNYX_FROM_NUMBER").unwrap_or_default(),
            },
        }
    }

    /// Warn once per missing credential block for the active provider.
    pub fn warn_missing_provider_credentials(&self, provider: &str) {
        match provider {
            "twilio" if self.twilio.account_sid.is_empty() || self.twilio.auth_token.is_empty() => {
                warn!("Twilio credentials incomplete; call origination will fail");
            }
            "telnyx" if self.telnyx.api_key.is_empty() || self.telnyx.connection_id.is_empty() => {
                warn!("Telnyx credentials incomplete; call control will fail");
            }
            _ => {}
        }
    }

    /// Negotiation defaults derived from these settings.
    pub fn negotiator_settings(&self) -> NegotiatorSettings {
        NegotiatorSettings {
            model: self.model.clone(),
            default_voice: self.voice.clone(),
            temperature: self.temperature,
            inbound_first_speaker: self.inbound_first_speaker,
            outbound_first_speaker: self.outbound_first_speaker,
            recording_enabled: self.recording_enabled,
            tools_enabled: self.tools_enabled,
            default_tools: self.default_tools.clone(),
            tool_guidelines: self.tool_guidelines.clone(),
            default_corpus: self.default_corpus.clone(),
            default_persona: self.default_persona.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        unsafe {
            for key in [
                "BRIDGE_SERVER__PORT",
                "BRIDGE_TELEPHONY__PROVIDER",
                "CONFIG_FILE",
                "PORT",
                "ULTRAVOX_TEMPERATURE",
                "DEFAULT_TOOLS",
                "INBOUND_FIRST_SPEAKER",
            ] {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_apply() {
        clear_env();
        let config = AppConfig::load_from_args(["voicebridge"]).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telephony.provider, "twilio");
        assert_eq!(config.state.pending_ttl_secs, 600);
    }

    #[test]
    #[serial]
    fn env_overrides_defaults() {
        clear_env();
        unsafe {
            env::set_var("BRIDGE_SERVER__PORT", "9090");
            env::set_var("BRIDGE_TELEPHONY__PROVIDER", "telnyx");
        }

        let config = AppConfig::load_from_args(["voicebridge"]).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.telephony.provider, "telnyx");

        clear_env();
    }

    #[test]
    #[serial]
    fn cli_flag_wins_over_env() {
        clear_env();
        unsafe {
            env::set_var("BRIDGE_SERVER__PORT", "9090");
        }

        let config = AppConfig::load_from_args(["voicebridge", "--port", "7070"]).unwrap();
        assert_eq!(config.server.port, 7070);

        clear_env();
    }

    #[test]
    #[serial]
    fn file_source_is_layered_in() {
        clear_env();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.yaml");
        std::fs::write(&path, "server:\n  port: 7171\n").unwrap();

        let config =
            AppConfig::load_from_args(["voicebridge", "--config", path.to_str().unwrap()])
                .unwrap();
        assert_eq!(config.server.port, 7171);
    }

    #[test]
    #[serial]
    fn voice_settings_defaults_and_clamping() {
        clear_env();
        unsafe {
            env::set_var("ULTRAVOX_TEMPERATURE", "3.5");
            env::set_var("DEFAULT_TOOLS", "weather, orders ,");
        }

        let settings = VoiceSettings::load_from_env();
        assert!((settings.temperature - 1.0).abs() < f64::EPSILON);
        assert_eq!(
            settings.default_tools,
            Some(vec!["weather".to_string(), "orders".to_string()])
        );
        assert_eq!(settings.inbound_first_speaker, FirstSpeaker::Agent);
        assert_eq!(settings.outbound_first_speaker, FirstSpeaker::User);

        clear_env();
    }
}
