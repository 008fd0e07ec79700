//! 테스트 지원 - 네트워크 없이 동작하는 임베딩/채팅 모델

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::{EmbeddingChoice, EmbeddingProvider};
use crate::error::RagError;
use crate::llm::ChatModel;
use crate::session::ProviderFactory;

/// 키워드 사전 (임베딩 축)
const VOCABULARY: [&str; 8] = [
    "근로소득",
    "양도소득",
    "이자소득",
    "세액공제",
    "거주자",
    "연말정산",
    "부양가족",
    "과세",
];

/// 키워드 등장 횟수로 벡터를 만드는 결정적 임베딩
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// embed / embed_query 호출 횟수
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|k| text.matches(k).count() as f32)
            .collect();
        // 키워드가 없어도 영벡터가 되지 않도록 상수 축 추가
        vector.push(0.5);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    fn name(&self) -> &str {
        "keyword-test"
    }
}

/// 미리 정한 응답을 순서대로 돌려주는 채팅 모델
///
/// 큐가 비면 기본 답변을 반환합니다. `Err` 항목은 실패로 돌려줍니다.
pub struct ScriptedChat {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    default_answer: String,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn new(default_answer: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_answer: default_answer.to_string(),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 다음 응답 추가
    pub fn push(self, response: std::result::Result<&str, &str>) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response.map(str::to_string).map_err(str::to_string));
        }
        self
    }

    /// 응답 지연 설정
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 지금까지 받은 프롬프트
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(self.default_answer.clone()),
        }
    }

    fn name(&self) -> &str {
        "scripted-test"
    }
}

/// 테스트용 프로바이더 팩토리
pub struct TestProviders {
    pub embedder: Arc<KeywordEmbedder>,
    pub chat: Arc<ScriptedChat>,
    created: AtomicUsize,
    embedder_keys: Mutex<Vec<Option<String>>>,
}

impl TestProviders {
    pub fn new(chat: ScriptedChat) -> Self {
        Self {
            embedder: Arc::new(KeywordEmbedder::new()),
            chat: Arc::new(chat),
            created: AtomicUsize::new(0),
            embedder_keys: Mutex::new(Vec::new()),
        }
    }

    /// 생성된 프로바이더 수 (임베딩 + 채팅)
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// 임베딩을 만들 때 받은 API 키 (생성 순서)
    pub fn embedder_keys(&self) -> Vec<Option<String>> {
        self.embedder_keys.lock().map(|k| k.clone()).unwrap_or_default()
    }
}

impl ProviderFactory for TestProviders {
    fn embedder(
        &self,
        choice: EmbeddingChoice,
        api_key: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>> {
        if choice.requires_api_key() && api_key.map_or(true, |k| k.trim().is_empty()) {
            return Err(RagError::MissingApiKey.into());
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut keys) = self.embedder_keys.lock() {
            keys.push(api_key.map(str::to_string));
        }
        Ok(self.embedder.clone())
    }

    fn chat_model(&self, _api_key: &str, _model: &str) -> Result<Arc<dyn ChatModel>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.chat.clone())
    }
}

/// 테스트용 세법 문서 텍스트
pub fn sample_tax_text() -> String {
    [
        "제1조(목적) 이 법은 개인의 소득에 대하여 소득의 성격과 납세자의 부담능력 등에 따라 적정하게 과세함으로써 조세부담의 형평을 도모하고 재정수입의 원활한 조달에 이바지함을 목적으로 한다.",
        "제2조(납세의무) 거주자는 이 법에 따라 각자의 소득에 대한 소득세를 납부할 의무를 진다. 비거주자로서 국내원천소득이 있는 개인도 납세의무를 진다.",
        "제20조(근로소득) 근로소득은 근로를 제공함으로써 받는 봉급, 급료, 보수, 세비, 임금, 상여, 수당과 이와 유사한 성질의 급여로 한다. 근로소득 금액은 총급여액에서 근로소득공제를 적용한 금액으로 한다.",
        "제94조(양도소득의 범위) 양도소득은 해당 과세기간에 발생한 토지 또는 건물의 양도로 발생하는 소득으로 한다.",
        "제59조의4(특별세액공제) 근로소득이 있는 거주자가 기본공제대상자를 위하여 보험료를 지급한 경우 세액공제를 받는다. 부양가족의 의료비와 교육비도 세액공제 대상이다.",
    ]
    .join("\n\n")
}
