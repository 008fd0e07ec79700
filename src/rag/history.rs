//! 대화 히스토리 - 최근 질문/답변을 제한된 개수만큼 보관

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::prompt::TAX_KEYWORDS;
use crate::config::DEFAULT_MAX_HISTORY;
use crate::knowledge::Chunk;

/// 대화 턴
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
    pub sources: Vec<Chunk>,
    /// 답변 중 세법 키워드가 포함된 문장 (최대 3개)
    pub context_summary: String,
}

/// 히스토리 상태
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStatus {
    pub enabled: bool,
    pub count: usize,
    pub max_history: usize,
    pub has_context: bool,
}

/// 대화 히스토리
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    max_history: usize,
    enabled: bool,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ConversationHistory {
    pub fn new(max_history: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_history),
            max_history,
            enabled: true,
        }
    }

    /// 턴 추가 (비활성화 상태면 무시, 초과 시 가장 오래된 턴 제거)
    pub fn add_turn(&mut self, question: &str, answer: &str, sources: Vec<Chunk>) -> bool {
        if !self.enabled || self.max_history == 0 {
            return false;
        }

        self.turns.push_back(Turn {
            timestamp: Utc::now(),
            question: question.to_string(),
            answer: answer.to_string(),
            sources,
            context_summary: extract_context(answer),
        });

        while self.turns.len() > self.max_history {
            self.turns.pop_front();
        }
        true
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 최근 3턴의 요약을 이어붙인 현재 맥락
    pub fn current_context(&self) -> String {
        let skip = self.turns.len().saturating_sub(3);
        self.turns
            .iter()
            .skip(skip)
            .map(|t| t.context_summary.as_str())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 새 질문과 키워드를 공유하는 이전 턴의 요약 (최근 2개)
    pub fn relevant_context(&self, question: &str) -> String {
        if !self.enabled || self.turns.is_empty() {
            return String::new();
        }

        let question_keywords = extract_keywords(question);
        if question_keywords.is_empty() {
            return String::new();
        }

        let relevant: Vec<&str> = self
            .turns
            .iter()
            .filter(|turn| {
                let text = format!("{} {}", turn.question, turn.answer);
                extract_keywords(&text)
                    .iter()
                    .any(|k| question_keywords.contains(k))
            })
            .map(|turn| turn.context_summary.as_str())
            .collect();

        let skip = relevant.len().saturating_sub(2);
        relevant[skip..].join(" ")
    }

    pub fn status(&self) -> HistoryStatus {
        HistoryStatus {
            enabled: self.enabled,
            count: self.turns.len(),
            max_history: self.max_history,
            has_context: !self.current_context().is_empty(),
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// 모든 턴 삭제, 삭제된 개수 반환
    pub fn clear(&mut self) -> usize {
        let removed = self.turns.len();
        self.turns.clear();
        removed
    }

    /// 삭제 후 활성화
    pub fn reset(&mut self) -> usize {
        self.enabled = true;
        self.clear()
    }

    /// 삭제 후 비활성화
    pub fn clear_and_disable(&mut self) -> usize {
        self.enabled = false;
        self.clear()
    }

    pub fn remove_last(&mut self) -> Option<Turn> {
        self.turns.pop_back()
    }

    /// 1부터 시작하는 번호로 턴 삭제
    pub fn remove_at(&mut self, number: usize) -> Option<Turn> {
        number.checked_sub(1).and_then(|index| self.turns.remove(index))
    }
}

/// 답변에서 키워드가 포함된 문장 추출 (최대 3개)
fn extract_context(answer: &str) -> String {
    let mut parts = Vec::new();
    for keyword in TAX_KEYWORDS.iter().filter(|k| answer.contains(*k)) {
        parts.extend(
            answer
                .split('.')
                .filter(|sentence| sentence.contains(keyword))
                .map(str::trim),
        );
    }
    parts.truncate(3);
    parts.join(". ")
}

fn extract_keywords(text: &str) -> Vec<&'static str> {
    TAX_KEYWORDS
        .iter()
        .copied()
        .filter(|k| text.contains(k))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_oldest_first() {
        let mut history = ConversationHistory::new(3);
        for i in 0..5 {
            history.add_turn(&format!("q{}", i), "a", vec![]);
            assert!(history.len() <= 3);
        }
        let questions: Vec<_> = history.turns().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn test_disabled_ignores_turns() {
        let mut history = ConversationHistory::default();
        history.disable();
        assert!(!history.add_turn("q", "a", vec![]));
        assert!(history.is_empty());

        history.enable();
        assert!(history.add_turn("q", "a", vec![]));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_clear_reset_and_disable() {
        let mut history = ConversationHistory::default();
        history.add_turn("q1", "a", vec![]);
        history.add_turn("q2", "a", vec![]);

        assert_eq!(history.clear_and_disable(), 2);
        assert!(!history.is_enabled());

        assert_eq!(history.reset(), 0);
        assert!(history.is_enabled());
    }

    #[test]
    fn test_remove_by_number() {
        let mut history = ConversationHistory::default();
        for q in ["q1", "q2", "q3"] {
            history.add_turn(q, "a", vec![]);
        }

        assert_eq!(history.remove_at(2).map(|t| t.question), Some("q2".to_string()));
        assert!(history.remove_at(0).is_none());
        assert!(history.remove_at(5).is_none());
        assert_eq!(history.remove_last().map(|t| t.question), Some("q3".to_string()));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_context_summary() {
        let summary = extract_context("근로소득은 급여입니다. 날씨가 좋네요. 세액공제도 있습니다.");
        assert_eq!(summary, "근로소득은 급여입니다. 세액공제도 있습니다");
        assert_eq!(extract_context("관련 없음"), "");
    }

    #[test]
    fn test_relevant_context_shares_keywords() {
        let mut history = ConversationHistory::default();
        history.add_turn("근로소득이란?", "근로소득은 급여입니다.", vec![]);
        history.add_turn("날씨?", "맑음.", vec![]);
        history.add_turn("양도소득?", "양도소득은 자산 양도 소득입니다.", vec![]);

        assert_eq!(history.relevant_context("근로소득 공제"), "근로소득은 급여입니다");
        assert_eq!(history.relevant_context("오늘 점심"), "");

        history.disable();
        assert_eq!(history.relevant_context("근로소득 공제"), "");
    }

    #[test]
    fn test_status() {
        let mut history = ConversationHistory::new(10);
        assert_eq!(
            history.status(),
            HistoryStatus {
                enabled: true,
                count: 0,
                max_history: 10,
                has_context: false
            }
        );

        history.add_turn("q", "소득세는 국세입니다.", vec![]);
        let status = history.status();
        assert_eq!(status.count, 1);
        assert!(status.has_context);
    }
}
