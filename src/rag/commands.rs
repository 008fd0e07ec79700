//! 명령어 처리 - 히스토리와 쿼리 최적화 제어
//!
//! 인식하지 못한 입력은 질문으로 취급합니다.

use super::engine::EnhancedRag;
use super::history::ConversationHistory;
use crate::cli::truncate_text;

/// 사용자 명령어
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    DisableHistory,
    EnableHistory,
    ClearHistory,
    ResetConversation,
    ClearAndDisable,
    RemoveLast,
    /// 1부터 시작하는 번호
    RemoveHistory(usize),
    HistoryStatus,
    ShowHistory,
    ShowContext,
    ToggleOptimization,
    OptimizationStatus,
    ToggleFewShot,
    Help,
    /// 형식이 잘못된 명령어 (사용법 메시지)
    InvalidUsage(&'static str),
}

impl Command {
    /// 입력을 명령어로 해석 (대소문자 무시)
    pub fn parse(input: &str) -> Option<Self> {
        let command = input.trim().to_lowercase();

        if let Some(rest) = command.strip_prefix("remove_history:") {
            return Some(match rest.trim().parse::<usize>() {
                Ok(n) if n >= 1 => Command::RemoveHistory(n),
                _ => Command::InvalidUsage("❌ 형식: remove_history:번호 (예: remove_history:1)"),
            });
        }

        let parsed = match command.as_str() {
            "disable_history" => Command::DisableHistory,
            "enable_history" => Command::EnableHistory,
            "clear_history" => Command::ClearHistory,
            "reset_conversation" => Command::ResetConversation,
            "clear_and_disable" => Command::ClearAndDisable,
            "remove_last" => Command::RemoveLast,
            "history_status" => Command::HistoryStatus,
            "show_history" => Command::ShowHistory,
            "show_context" => Command::ShowContext,
            "toggle_optimization" => Command::ToggleOptimization,
            "optimization_status" => Command::OptimizationStatus,
            "toggle_few_shot" => Command::ToggleFewShot,
            "help" => Command::Help,
            _ => return None,
        };
        Some(parsed)
    }
}

/// 명령어 도움말
pub const HELP_TEXT: &str = "\
📋 사용 가능한 명령어:
  disable_history      대화 히스토리 비활성화
  enable_history       대화 히스토리 활성화
  clear_history        대화 히스토리 초기화
  reset_conversation   대화 완전 초기화 (히스토리 활성화)
  clear_and_disable    초기화 후 비활성화
  remove_last          마지막 대화 제거
  remove_history:N     N번째 대화 제거
  history_status       히스토리 상태
  show_history         최근 대화 보기
  show_context         현재 대화 컨텍스트
  toggle_optimization  쿼리 최적화 켜기/끄기
  optimization_status  쿼리 최적화 상태
  toggle_few_shot      답변 예시 켜기/끄기";

/// 최근 대화 표시 개수
const SHOW_HISTORY_LIMIT: usize = 5;

/// 히스토리와 엔진에 명령을 적용하는 처리기
pub struct CommandProcessor<'a> {
    history: &'a mut ConversationHistory,
    engine: &'a mut EnhancedRag,
}

impl<'a> CommandProcessor<'a> {
    pub fn new(history: &'a mut ConversationHistory, engine: &'a mut EnhancedRag) -> Self {
        Self { history, engine }
    }

    /// 명령어면 실행 결과 메시지, 아니면 None
    pub fn process(&mut self, input: &str) -> Option<String> {
        Command::parse(input).map(|command| self.execute(command))
    }

    pub fn execute(&mut self, command: Command) -> String {
        match command {
            Command::DisableHistory => {
                self.history.disable();
                "🚫 대화 히스토리가 비활성화되었습니다.".to_string()
            }
            Command::EnableHistory => {
                self.history.enable();
                "✅ 대화 히스토리가 활성화되었습니다.".to_string()
            }
            Command::ClearHistory => {
                let removed = self.history.clear();
                format!("🗑️  대화 히스토리가 초기화되었습니다. (제거된 대화: {}개)", removed)
            }
            Command::ResetConversation => {
                let removed = self.history.reset();
                format!(
                    "🔄 대화가 완전히 초기화되었습니다.\n  - 제거된 대화: {}개\n  - 히스토리 상태: 활성화로 복원",
                    removed
                )
            }
            Command::ClearAndDisable => {
                let removed = self.history.clear_and_disable();
                format!(
                    "🚫 대화 히스토리가 초기화되고 비활성화되었습니다.\n  - 제거된 대화: {}개\n  - 향후 대화는 저장되지 않습니다.",
                    removed
                )
            }
            Command::RemoveLast => match self.history.remove_last() {
                Some(turn) => format!(
                    "🗑️  마지막 대화가 제거되었습니다:\n  질문: {}\n  답변: {}",
                    turn.question,
                    truncate_text(&turn.answer, 50)
                ),
                None => "❌ 제거할 대화가 없습니다.".to_string(),
            },
            Command::RemoveHistory(number) => match self.history.remove_at(number) {
                Some(turn) => format!(
                    "🗑️  대화 {}이 제거되었습니다:\n  질문: {}\n  답변: {}",
                    number,
                    turn.question,
                    truncate_text(&turn.answer, 50)
                ),
                None => format!("❌ 인덱스 {}의 대화가 존재하지 않습니다.", number),
            },
            Command::HistoryStatus => {
                let status = self.history.status();
                format!(
                    "📊 대화 히스토리 상태:\n  활성화: {}\n  저장된 대화: {}개\n  최대 저장: {}개\n  컨텍스트: {}",
                    check(status.enabled),
                    status.count,
                    status.max_history,
                    if status.has_context { "있음" } else { "없음" }
                )
            }
            Command::ShowHistory => self.show_history(),
            Command::ShowContext => {
                let context = self.history.current_context();
                if context.is_empty() {
                    "📝 현재 대화 컨텍스트가 없습니다.".to_string()
                } else {
                    format!("📝 현재 대화 컨텍스트:\n{}", context)
                }
            }
            Command::ToggleOptimization => {
                if self.engine.toggle_optimization() {
                    "✅ 쿼리 최적화 기능이 활성화되었습니다.".to_string()
                } else {
                    "🚫 쿼리 최적화 기능이 비활성화되었습니다.".to_string()
                }
            }
            Command::OptimizationStatus => {
                let status = self.engine.optimization_status();
                format!(
                    "🔧 쿼리 최적화 상태:\n  활성화: {}\n  답변 예시: {}\n  사전 항목: {}개",
                    check(status.enabled),
                    check(status.few_shot),
                    status.dictionary_count
                )
            }
            Command::ToggleFewShot => {
                if self.engine.toggle_few_shot() {
                    "✅ 답변 예시(few-shot)가 활성화되었습니다.".to_string()
                } else {
                    "🚫 답변 예시(few-shot)가 비활성화되었습니다.".to_string()
                }
            }
            Command::Help => HELP_TEXT.to_string(),
            Command::InvalidUsage(message) => message.to_string(),
        }
    }

    fn show_history(&self) -> String {
        if !self.history.is_enabled() {
            return "🚫 대화 히스토리가 비활성화되어 있습니다.".to_string();
        }
        if self.history.is_empty() {
            return "📝 대화 히스토리가 없습니다.".to_string();
        }

        let mut out = format!("📝 최근 대화 히스토리 (최대 {}개):\n", SHOW_HISTORY_LIMIT);
        let skip = self.history.len().saturating_sub(SHOW_HISTORY_LIMIT);
        for (i, turn) in self.history.turns().skip(skip).enumerate() {
            out.push_str(&format!(
                "\n💬 교환 {}:\n  질문: {}\n  답변: {}\n  컨텍스트: {}\n",
                i + 1,
                turn.question,
                truncate_text(&turn.answer, 100),
                turn.context_summary
            ));
        }
        out
    }
}

fn check(flag: bool) -> &'static str {
    if flag {
        "✅"
    } else {
        "❌"
    }
}

// ============================================================================
// Tests
// ============================================================================
