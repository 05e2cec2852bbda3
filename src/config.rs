//! 설정 로드
//!
//! 우선순위 (높은 순):
//! 1. `APPHELPER__SECTION__KEY` 환경변수 (예: `APPHELPER__SERVER__API_TOKEN`)
//! 2. `.env` 파일 (dotenvy로 환경변수에 주입)
//! 3. `apphelper.toml` 설정 파일 (선택)
//! 4. 기본값

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::resilience::CircuitBreakerConfig;

/// 데이터 디렉토리 경로 반환 (LanceDB 기본 위치)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".apphelper-rag")
}

// ============================================================================
// Settings
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub embedding: EmbeddingSettings,
    pub store: StoreSettings,
    pub llm: LlmSettings,
    pub breaker: BreakerSettings,
    pub chat: ChatSettings,
    pub log_level: LogLevel,
}

/// 로그 레벨 (`RUST_LOG`가 있으면 그쪽이 우선)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LogLevel(pub String);

impl Default for LogLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

/// HTTP 서버 설정
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub port: u16,
    /// `/chat`, `/ingest` 공유 비밀 토큰
    pub api_token: String,
    pub timeout_secs: u64,
    /// 클라이언트 IP당 분당 요청 수 (0이면 비활성)
    pub rate_limit_per_minute: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            api_token: "secret-token".to_string(),
            timeout_secs: 60,
            rate_limit_per_minute: 0,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind_addr, self.port);
        addr.parse()
            .with_context(|| format!("Invalid bind address: {addr}"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 임베딩 설정
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `http` 또는 `hashing`
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    /// 429 및 전송 에러 재시도 횟수 (0이면 요청당 한 번만 시도)
    pub max_retries: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "http".to_string(),
            base_url: "http://localhost:8081".to_string(),
            model: "intfloat/multilingual-e5-large".to_string(),
            dimension: 1024,
            max_retries: 0,
        }
    }
}

/// 벡터 저장소 설정
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// `chroma`, `lance`, `memory`
    pub backend: String,
    pub host: String,
    pub port: u16,
    /// LanceDB 데이터 디렉토리
    pub data_dir: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: "chroma".to_string(),
            host: "localhost".to_string(),
            port: 8000,
            data_dir: get_data_dir(),
        }
    }
}

/// 언어 모델 설정
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSettings {
    /// llama.cpp 서버 주소 (비어 있으면 모델 사용 불가)
    pub base_url: String,
    /// 로그용 모델 식별자
    pub model: String,
    pub max_tokens: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".to_string(),
            model: "meltemi7b.q4km.gguf".to_string(),
            max_tokens: 512,
        }
    }
}

/// 서킷 브레이커 설정
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub fail_max: u32,
    pub reset_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            fail_max: 2,
            reset_timeout_secs: 30,
        }
    }
}

impl From<BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: BreakerSettings) -> Self {
        CircuitBreakerConfig {
            fail_max: settings.fail_max.max(1),
            reset_timeout: Duration::from_secs(settings.reset_timeout_secs),
        }
    }
}

/// 챗 설정
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatSettings {
    pub top_k: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// 현재 디렉토리(또는 상위)의 `.env`를 환경변수로 적재, 찾은 경로 반환
///
/// `.env`는 없어도 됩니다. 로깅 초기화 전에 호출되므로 여기서는 로그를 남기지 않습니다.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// 지정한 `.env` 파일 적재 (이미 설정된 환경변수는 덮어쓰지 않음)
pub fn load_env_file_from(path: &Path) -> Result<PathBuf> {
    dotenvy::from_path(path)
        .with_context(|| format!("Failed to load env file {}", path.display()))?;
    Ok(path.to_path_buf())
}

impl Settings {
    /// 기본 위치에서 설정 로드 (`.env`는 `load_env_file`로 먼저 적재)
    pub fn load() -> Result<Self> {
        Self::load_from(config::File::with_name("apphelper").required(false))
    }

    /// 지정한 파일 소스 + 환경변수로 설정 로드
    pub fn load_from<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings: Settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("APPHELPER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        if settings.server.api_token.is_empty() {
            anyhow::bail!("server.api_token must not be empty");
        }

        Ok(settings)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.rate_limit_per_minute, 0);
        assert_eq!(settings.breaker.fail_max, 2);
        assert_eq!(settings.breaker.reset_timeout_secs, 30);
        assert_eq!(settings.chat.top_k, 3);
        assert_eq!(settings.store.port, 8000);
        assert_eq!(settings.embedding.model, "intfloat/multilingual-e5-large");
        assert_eq!(settings.embedding.max_retries, 0);
        assert_eq!(settings.log_level.0, "info");
    }

    #[test]
    fn test_socket_addr() {
        let settings = ServerSettings::default();
        assert_eq!(settings.socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"log_level = "debug"

[server]
api_token = "file-token"
port = 9000

[store]
backend = "memory"

[breaker]
fail_max = 5

[embedding]
max_retries = 2"#
        )
        .unwrap();

        let path = file.path().to_path_buf();
        let settings = Settings::load_from(config::File::from(path)).unwrap();

        assert_eq!(settings.server.api_token, "file-token");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.store.backend, "memory");
        assert_eq!(settings.breaker.fail_max, 5);
        assert_eq!(settings.breaker.reset_timeout_secs, 30);
        assert_eq!(settings.log_level.0, "debug");
        assert_eq!(settings.embedding.max_retries, 2);
    }

    #[test]
    fn test_load_env_file_from_sets_variables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "APPHELPER_ENV_FILE_TEST=from-dotenv").unwrap();

        let loaded = load_env_file_from(file.path()).unwrap();
        assert_eq!(loaded, file.path());
        assert_eq!(
            std::env::var("APPHELPER_ENV_FILE_TEST").unwrap(),
            "from-dotenv"
        );

        assert!(load_env_file_from(Path::new("/nonexistent/.env")).is_err());
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\napi_token = \"\"").unwrap();

        let path = file.path().to_path_buf();
        assert!(Settings::load_from(config::File::from(path)).is_err());
    }

    #[test]
    fn test_breaker_config_conversion() {
        let config: CircuitBreakerConfig = BreakerSettings {
            fail_max: 0,
            reset_timeout_secs: 5,
        }
        .into();
        assert_eq!(config.fail_max, 1);
        assert_eq!(config.reset_timeout, Duration::from_secs(5));
    }
}
