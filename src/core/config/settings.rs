use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, GradingSettings,
    RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings,
    Settings, TelemetrySettings, VideoSettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("SCHOOLHUB_HOST", "0.0.0.0");
        let port = env_or_default("SCHOOLHUB_PORT", "8000");

        let environment = parse_environment(
            env_optional("SCHOOLHUB_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("SCHOOLHUB_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "SchoolHub API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };
        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "schoolhub");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "schoolhub_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let ai = AiSettings {
            openai_api_key: env_or_default("OPENAI_API_KEY", ""),
            openai_base_url: env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            ai_model: env_or_default("AI_MODEL", "gpt-4o-mini"),
            ai_max_tokens: parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "1500"))?,
            ai_temperature: parse_f64("AI_TEMPERATURE", env_or_default("AI_TEMPERATURE", "0.2"))?,
            ai_request_timeout: parse_u64(
                "AI_REQUEST_TIMEOUT",
                env_or_default("AI_REQUEST_TIMEOUT", "60"),
            )?,
            max_retries: parse_u32("AI_MAX_RETRIES", env_or_default("AI_MAX_RETRIES", "3"))?,
            retry_base_delay_ms: parse_u64(
                "AI_RETRY_BASE_DELAY_MS",
                env_or_default("AI_RETRY_BASE_DELAY_MS", "1000"),
            )?,
            min_interval_ms: parse_u64(
                "AI_MIN_INTERVAL_MS",
                env_or_default("AI_MIN_INTERVAL_MS", "500"),
            )?,
            burst: parse_u32("AI_BURST", env_or_default("AI_BURST", "1"))?,
            parallel_calls: env_optional("AI_PARALLEL_CALLS")
                .map(|value| parse_bool(&value))
                .unwrap_or(false),
        };

        let grading = GradingSettings {
            min_content_chars: parse_usize(
                "GRADING_MIN_CONTENT_CHARS",
                env_or_default("GRADING_MIN_CONTENT_CHARS", "10"),
            )?,
            deadline_seconds: parse_u64(
                "GRADING_DEADLINE_SECONDS",
                env_or_default("GRADING_DEADLINE_SECONDS", "180"),
            )?,
        };

        let video = VideoSettings {
            api_key: env_or_default("VIDEO_API_KEY", ""),
            base_url: env_or_default("VIDEO_BASE_URL", ""),
            request_timeout: parse_u64(
                "VIDEO_REQUEST_TIMEOUT",
                env_or_default("VIDEO_REQUEST_TIMEOUT", "30"),
            )?,
            job_ttl_seconds: parse_u64(
                "VIDEO_JOB_TTL_SECONDS",
                env_or_default("VIDEO_JOB_TTL_SECONDS", "86400"),
            )?,
        };

        let log_level = env_or_default("SCHOOLHUB_LOG_LEVEL", "info");
        let json = env_optional("SCHOOLHUB_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost::parse(host)?, port: ServerPort::parse(port)? },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            ai,
            grading,
            video,
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn video(&self) -> &VideoSettings {
        &self.video
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ai.burst == 0 {
            return Err(ConfigError::InvalidValue { field: "AI_BURST", value: "0".to_string() });
        }
        if self.ai.max_retries > 10 {
            return Err(ConfigError::InvalidValue {
                field: "AI_MAX_RETRIES",
                value: self.ai.max_retries.to_string(),
            });
        }
        if self.grading.deadline_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADING_DEADLINE_SECONDS",
                value: "0".to_string(),
            });
        }
        if self.video.job_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "VIDEO_JOB_TTL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.video.api_key.is_empty() || self.video.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("VIDEO_API_KEY/VIDEO_BASE_URL"));
        }

        Ok(())
    }
}
