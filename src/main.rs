//! apphelper-rag CLI 진입점

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = apphelper_rag::cli::Cli::parse();

    // .env를 먼저 적재해야 RUST_LOG와 APPHELPER__* 값이 반영됨
    let env_file = apphelper_rag::config::load_env_file();
    let settings = apphelper_rag::config::Settings::load()?;

    // 로깅 초기화 (RUST_LOG가 있으면 설정보다 우선)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level.0))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = env_file {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(apphelper_rag::cli::run(cli, settings))
}
