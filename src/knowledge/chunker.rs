//! Text Chunking Module
//!
//! 재귀 문자 분할기: 큰 구분자(문단)부터 시도하여 청크 크기를 넘는 조각만
//! 더 작은 구분자(줄, 공백, 문자)로 다시 나눕니다. 인접 청크는 오버랩을 가집니다.
//! 길이는 바이트가 아닌 문자(char) 수로 계산합니다 (한글 안전).

use std::collections::VecDeque;

use crate::config::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

/// 기본 구분자 (우선순위 순)
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// 설정 생성 (오버랩은 청크 크기보다 작아야 함)
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> anyhow::Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than 0");
        }
        if chunk_overlap >= chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 문자 분할 청커
pub struct RecursiveChunker {
    config: ChunkConfig,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // 텍스트에 존재하는 첫 번째 구분자 선택 ("" 는 항상 매치)
        let (index, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(sep.as_str()))
            .map(|(i, sep)| (i, sep.as_str()))
            .unwrap_or((separators.len(), ""));
        let remaining = separators.get(index + 1..).unwrap_or(&[]);

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut good_splits: Vec<String> = Vec::new();

        for split in splits {
            if char_len(&split) < self.config.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                chunks.extend(self.merge_splits(&good_splits, separator));
                good_splits.clear();
            }

            if remaining.is_empty() {
                chunks.push(split);
            } else {
                chunks.extend(self.split_recursive(&split, remaining));
            }
        }

        if !good_splits.is_empty() {
            chunks.extend(self.merge_splits(&good_splits, separator));
        }

        chunks
    }

    /// 작은 조각들을 청크 크기 이내로 병합하고 오버랩을 유지
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);
            let joined_len = |total: usize, current: &VecDeque<&str>| {
                total + len + if current.is_empty() { 0 } else { separator_len }
            };

            if joined_len(total, &current) > self.config.chunk_size {
                if !current.is_empty() {
                    push_joined(&mut docs, &current, separator);

                    // 오버랩 크기 이하가 될 때까지 앞쪽 조각 제거
                    while total > self.config.chunk_overlap
                        || (total > 0 && joined_len(total, &current) > self.config.chunk_size)
                    {
                        let Some(first) = current.pop_front() else {
                            break;
                        };
                        let removed = char_len(first)
                            + if current.is_empty() { 0 } else { separator_len };
                        total = total.saturating_sub(removed);
                    }
                }
            }

            total += len + if current.is_empty() { 0 } else { separator_len };
            current.push_back(split);
        }

        push_joined(&mut docs, &current, separator);
        docs
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks = self.split_recursive(text, &self.separators);
        chunks.retain(|c| !c.trim().is_empty());
        chunks
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정을 지정하여 청커 생성
pub fn recursive_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkConfig::new(size, overlap).unwrap())
    }

    #[test]
    fn test_chunker_empty() {
        let chunks = RecursiveChunker::with_defaults().chunk("  \n ");
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = RecursiveChunker::with_defaults().chunk("제1조(목적) 소득세법");
        assert_eq!(chunks, vec!["제1조(목적) 소득세법".to_string()]);
    }

    #[test]
    fn test_paragraphs_kept_together_when_they_fit() {
        let text = "첫 번째 문단입니다.\n\n두 번째 문단입니다.\n\n세 번째 문단입니다.";
        let chunks = chunker(20, 0).chunk(text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "첫 번째 문단입니다.");
    }

    #[test]
    fn test_windows_respect_size() {
        let text = (0..200)
            .map(|i| format!("단어{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunker(50, 20).chunk(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "oversized: {}", chunk);
        }
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let text = (0..100)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunker(50, 20).chunk(&text);

        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(
                pair[1].split(' ').any(|w| w == last_word),
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_no_overlap() {
        let text = "a b c d e f g h";
        let chunks = chunker(7, 0).chunk(text);
        assert_eq!(chunks, vec!["a b c d", "e f g h"]);
    }

    #[test]
    fn test_long_word_falls_back_to_chars() {
        let text = "가".repeat(25);
        let chunks = chunker(10, 0).chunk(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkConfig::new(100, 100).is_err());
        assert!(ChunkConfig::new(0, 0).is_err());
        assert!(ChunkConfig::new(1500, 200).is_ok());

        let default = ChunkConfig::default();
        assert_eq!(default.chunk_size, 1500);
        assert_eq!(default.chunk_overlap, 200);
    }
}
