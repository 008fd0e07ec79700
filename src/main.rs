//! tax-rag CLI 진입점

use anyhow::Result;
use clap::Parser;
use tax_rag::RagError;

fn main() -> Result<()> {
    // 로깅 초기화
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // CLI 실행
    let cli = tax_rag::cli::Cli::parse();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(tax_rag::cli::run(cli));

    if let Err(e) = result {
        tracing::debug!("Command failed: {:#}", e);
        let err = RagError::classify(e);
        eprintln!("[!] {}", err.user_message());
        std::process::exit(1);
    }
    Ok(())
}
