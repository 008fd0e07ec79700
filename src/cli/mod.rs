//! CLI 모듈
//!
//! tax-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Settings;
use crate::embedding::EmbeddingChoice;
use crate::knowledge::{IngestReport, StoreStats};
use crate::rag::QueryOutcome;
use crate::session::{AppContext, SessionConfig, SessionReply};
use crate::web::{self, LaunchMode};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "tax-rag")]
#[command(version, about = "소득세 RAG 챗봇", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 임베딩 프로바이더 (gemini | local)
    #[arg(long, global = true)]
    pub embedding: Option<EmbeddingChoice>,

    /// 쿼리 최적화 끄기
    #[arg(long, global = true)]
    pub no_optimization: bool,

    /// 답변 예시(few-shot) 끄기
    #[arg(long, global = true)]
    pub no_few_shot: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 웹 앱 실행 (user: 8501, admin: 8502)
    Launch {
        /// 실행 모드
        #[arg(value_enum)]
        mode: LaunchMode,

        /// 관리자 모드 확인 생략
        #[arg(short, long)]
        yes: bool,
    },

    /// 터미널 대화 모드
    Chat,

    /// 질문 한 번 하기
    Ask {
        /// 질문
        question: String,
    },

    /// 문서를 벡터 저장소에 적재
    Ingest {
        /// 적재할 문서 (기본: 설정의 문서)
        #[arg(long)]
        file: Option<PathBuf>,

        /// 이미 적재되어 있어도 다시 적재
        #[arg(long)]
        force: bool,
    },

    /// 벡터 DB 관리
    Db {
        #[command(subcommand)]
        action: DbCommand,
    },
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// 저장소 상태
    Status,
    /// 저장소 백업
    Backup,
    /// 백업 목록
    Backups,
    /// 백업에서 복원
    Restore {
        /// 백업 이름 (db backups 참고)
        name: String,
    },
    /// 저장소 삭제
    Delete {
        /// 확인 생략
        #[arg(short, long)]
        yes: bool,
    },
    /// 삭제 후 다시 적재
    Rebuild,
}

impl Cli {
    /// 환경변수 설정에 CLI 플래그 적용
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(choice) = self.embedding {
            settings.embedding = choice;
        }
        if self.no_optimization {
            settings.use_query_optimization = false;
        }
        if self.no_few_shot {
            settings.use_few_shot = false;
        }
        settings
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = cli.apply(Settings::from_env());
    tracing::debug!("Data directory: {:?}", settings.data_dir);
    let ctx = Arc::new(AppContext::new(settings));

    match cli.command {
        Commands::Launch { mode, yes } => cmd_launch(ctx, mode, yes).await,
        Commands::Chat => cmd_chat(&ctx).await,
        Commands::Ask { question } => cmd_ask(&ctx, &question).await,
        Commands::Ingest { file, force } => cmd_ingest(&ctx, file, force).await,
        Commands::Db { action } => cmd_db(&ctx, action).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 웹 앱 실행 명령어 (launch)
async fn cmd_launch(ctx: Arc<AppContext>, mode: LaunchMode, yes: bool) -> Result<()> {
    if mode.includes_admin() && !admin_confirmed(yes, std::env::var("ADMIN_MODE").ok()) {
        println!("[!] 관리자 앱은 벡터 DB를 삭제/복원할 수 있습니다.");
        if !confirm("계속하시겠습니까? (y/N): ")? {
            println!("[*] 취소되었습니다.");
            return Ok(());
        }
    }

    let settings = ctx.settings();
    println!("[*] 문서: {}", settings.document_path.display());
    println!("[*] 임베딩: {}", settings.embedding.label());
    if settings.api_key.is_none() {
        println!("[!] API 키 미설정 - 웹 화면에서 입력해야 합니다.");
    }

    web::serve(ctx, mode).await
}

/// 터미널 대화 명령어 (chat)
async fn cmd_chat(ctx: &AppContext) -> Result<()> {
    println!("[*] 벡터 저장소 준비 중...");
    let mut session = ctx.create_session(SessionConfig::default()).await?;

    println!("[OK] 준비 완료 ({})", session.status().embedding.label());
    println!();
    println!("💰 소득세 RAG 챗봇 - 질문을 입력하세요. (종료: exit, 명령어: help)");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("🙋 질문: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit(input) {
            break;
        }

        match session.handle_input(input).await {
            SessionReply::Command { message } => println!("{}\n", message),
            SessionReply::Answer(outcome) => print_outcome(&outcome),
        }
    }

    println!("[*] 대화를 종료합니다.");
    Ok(())
}

/// 단일 질문 명령어 (ask)
async fn cmd_ask(ctx: &AppContext, question: &str) -> Result<()> {
    let mut session = ctx.create_session(SessionConfig::default()).await?;
    let outcome = session.process_query(question).await;
    print_outcome(&outcome);
    Ok(())
}

/// 문서 적재 명령어 (ingest)
async fn cmd_ingest(ctx: &AppContext, file: Option<PathBuf>, force: bool) -> Result<()> {
    let settings = ctx.settings();
    let document = file.unwrap_or_else(|| settings.document_path.clone());
    let embedder = ctx.embedder(settings.embedding, None).await?;
    let database = ctx.database(settings.embedding).await;

    println!("[*] 적재 중: {}", document.display());
    let report = database.ingest(embedder.as_ref(), &document, force).await?;
    print_report(&report);
    Ok(())
}

/// 벡터 DB 관리 명령어 (db)
async fn cmd_db(ctx: &AppContext, action: DbCommand) -> Result<()> {
    let choice = ctx.settings().embedding;
    let database = ctx.database(choice).await;

    match action {
        DbCommand::Status => print_stats(&database.stats().await?),
        DbCommand::Backup => {
            let info = database.backup().await?;
            println!("[OK] 백업 완료: {}", info.name);
            println!("     경로: {}", info.path.display());
            println!("     크기: {}", format_bytes(info.size_bytes));
        }
        DbCommand::Backups => {
            let backups = database.list_backups()?;
            if backups.is_empty() {
                println!("[!] 백업이 없습니다.");
                return Ok(());
            }
            println!("[OK] 백업 목록 ({} 건):\n", backups.len());
            for backup in backups {
                println!(
                    "  {}  {}  {}",
                    backup.name,
                    backup.created_at.format("%Y-%m-%d %H:%M"),
                    format_bytes(backup.size_bytes)
                );
            }
        }
        DbCommand::Restore { name } => {
            let stats = database.restore(&name).await?;
            ctx.clear_database_cache(choice).await;
            println!("[OK] 복원 완료: {}", name);
            print_stats(&stats);
        }
        DbCommand::Delete { yes } => {
            if !yes && !confirm(&format!("{} 저장소를 삭제하시겠습니까? (y/N): ", choice))? {
                println!("[*] 취소되었습니다.");
                return Ok(());
            }
            if database.delete().await? {
                ctx.clear_database_cache(choice).await;
                println!("[OK] 저장소 삭제됨: {}", database.store_dir().display());
            } else {
                println!("[!] 삭제할 저장소가 없습니다.");
            }
        }
        DbCommand::Rebuild => {
            let embedder = ctx.embedder(choice, None).await?;
            println!("[*] 재구축 중...");
            let report = database
                .rebuild(embedder.as_ref(), &ctx.settings().document_path)
                .await
                .context("재구축 실패")?;
            print_report(&report);
        }
    }

    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_outcome(outcome: &QueryOutcome) {
    if !outcome.success {
        println!("\n[!] {}\n", outcome.answer);
        return;
    }

    println!("\n🤖 답변:\n{}\n", outcome.answer);
    if outcome.optimization_used && outcome.improved_query != outcome.original_query {
        println!("🔍 개선된 질문: {}", outcome.improved_query);
    }
    for (i, source) in outcome.sources.iter().enumerate() {
        println!(
            "📄 [{}] (점수: {:.4}) {}",
            i + 1,
            source.score,
            truncate_text(&source.chunk.text, 100)
        );
    }
    println!("⏱️  {:.1}초\n", outcome.elapsed_ms as f64 / 1000.0);
}

fn print_report(report: &IngestReport) {
    if report.skipped {
        println!(
            "[OK] 이미 적재되어 있습니다 ({} 청크). 다시 적재하려면 --force",
            report.total_chunks
        );
    } else {
        println!(
            "[OK] 적재 완료: {} 청크 저장 (전체 {} 청크, {:.1}초)",
            report.chunks_written,
            report.total_chunks,
            report.elapsed_ms as f64 / 1000.0
        );
    }
}

fn print_stats(stats: &StoreStats) {
    println!("[*] 저장소: {}", stats.path.display());
    if !stats.exists {
        println!("[!] 저장소가 없습니다.");
        return;
    }
    println!("[OK] 청크: {} 개", stats.chunk_count);
    println!(
        "     크기: {} ({} 파일)",
        format_bytes(stats.size_bytes),
        stats.file_count
    );
    for record in &stats.ingested {
        println!(
            "     문서: {} ({} 청크, {})",
            record.source,
            record.chunk_count,
            record.ingested_at.format("%Y-%m-%d %H:%M")
        );
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `--yes` 또는 ADMIN_MODE 환경변수가 있으면 확인 생략
fn admin_confirmed(yes: bool, admin_mode: Option<String>) -> bool {
    yes || admin_mode.is_some_and(|v| !v.trim().is_empty() && v.trim() != "0")
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "예" | "네")
}

fn is_exit(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "exit" | "quit" | "종료")
}

/// 텍스트 자르기 (UTF-8 안전)
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        let truncated = truncate_text(korean, 5);
        assert_eq!(truncated, "안녕하세요...");
    }

    #[test]
    fn test_parse_launch() {
        let cli = Cli::try_parse_from(["tax-rag", "launch", "both", "--yes"]).unwrap();
        match cli.command {
            Commands::Launch { mode, yes } => {
                assert_eq!(mode, LaunchMode::Both);
                assert!(yes);
            }
            _ => panic!("expected launch"),
        }
        assert!(Cli::try_parse_from(["tax-rag", "launch", "server"]).is_err());
    }

    #[test]
    fn test_global_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "tax-rag",
            "ask",
            "근로소득이란?",
            "--embedding",
            "local",
            "--no-optimization",
        ])
        .unwrap();

        let settings = cli.apply(Settings::default());
        assert_eq!(settings.embedding, EmbeddingChoice::Local);
        assert!(!settings.use_query_optimization);
        assert!(settings.use_few_shot);
    }

    #[test]
    fn test_parse_db_restore() {
        let cli = Cli::try_parse_from(["tax-rag", "db", "restore", "store_gemini_20240101_000000"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Db { action: DbCommand::Restore { ref name } } if name == "store_gemini_20240101_000000"
        ));
    }

    #[test]
    fn test_admin_confirmation() {
        assert!(admin_confirmed(true, None));
        assert!(admin_confirmed(false, Some("1".to_string())));
        assert!(!admin_confirmed(false, Some("0".to_string())));
        assert!(!admin_confirmed(false, None));
    }

    #[test]
    fn test_answers() {
        assert!(is_yes(" Y\n"));
        assert!(is_yes("네"));
        assert!(!is_yes(""));
        assert!(is_exit("QUIT"));
        assert!(!is_exit("근로소득"));
    }
}
