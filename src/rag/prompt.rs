//! 프롬프트 템플릿과 세법 용어 사전

use crate::knowledge::RetrievedChunk;

/// 일상 표현 -> 세법 용어 사전 (쿼리 개선용)
pub const TAX_DICTIONARY: [&str; 10] = [
    "사람을 나타내는 표현 -> 거주자",
    "직장인, 월급쟁이 -> 근로소득이 있는 거주자",
    "월급, 연봉 -> 총급여액",
    "집 팔았을 때 -> 양도소득",
    "은행 이자 -> 이자소득",
    "주식 배당금 -> 배당소득",
    "프리랜서, 자영업자 -> 사업소득이 있는 거주자",
    "세금 돌려받기 -> 환급",
    "부모님, 자녀 -> 부양가족",
    "13월의 월급 -> 연말정산",
];

/// 대화 맥락 추출용 세법 키워드
pub const TAX_KEYWORDS: [&str; 16] = [
    "소득세",
    "근로소득",
    "사업소득",
    "양도소득",
    "이자소득",
    "배당소득",
    "연금소득",
    "총급여",
    "세액공제",
    "소득공제",
    "과세표준",
    "세율",
    "거주자",
    "연말정산",
    "부양가족",
    "원천징수",
];

/// 답변 예시 (few-shot)
pub const ANSWER_EXAMPLES: [(&str, &str); 3] = [
    (
        "연봉 5천만원인 직장인의 소득세는 얼마인가요?",
        "근로소득이 있는 거주자의 총급여액이 5천만원이라면, 근로소득공제를 적용한 근로소득금액에서 \
         인적공제 등 종합소득공제를 뺀 과세표준에 기본세율(6%~45%)을 적용하여 산출세액을 계산합니다. \
         이후 근로소득세액공제 등 세액공제를 빼면 결정세액이 됩니다.",
    ),
    (
        "집을 팔았는데 세금을 내야 하나요?",
        "토지나 건물을 양도하여 발생한 소득은 양도소득으로 과세됩니다. 다만 1세대 1주택 요건을 \
         충족하면 비과세될 수 있으며, 양도가액이 12억원을 넘는 고가주택은 초과분에 대해 과세됩니다.",
    ),
    (
        "부모님을 부양하면 공제받을 수 있나요?",
        "거주자가 연간 소득금액 100만원 이하인 60세 이상의 직계존속을 부양하는 경우, \
         부양가족 1명당 150만원의 기본공제를 받을 수 있습니다. 70세 이상이면 경로우대 추가공제도 적용됩니다.",
    ),
];

// ============================================================================
// Prompt Builders
// ============================================================================

/// 쿼리 개선 프롬프트
pub fn build_rewrite_prompt(question: &str) -> String {
    format!(
        "사용자의 질문을 보고, 우리의 세금 관련 사전을 참고해서 사용자의 질문을 변경해주세요.\n\
         만약 변경할 필요가 없다고 판단된다면, 사용자의 질문을 변경하지 않아도 됩니다.\n\
         그런 경우에는 질문만 리턴해주세요.\n\n\
         세금 관련 사전: {}\n\n\
         질문: {}\n\n\
         개선된 질문:",
        TAX_DICTIONARY.join(", "),
        question
    )
}

/// 답변 생성 프롬프트
pub fn build_answer_prompt(
    question: &str,
    chunks: &[RetrievedChunk],
    history_context: &str,
    use_few_shot: bool,
) -> String {
    let mut prompt = String::from(
        "당신은 한국 소득세법 전문가입니다. 아래에 검색된 소득세법 조문만 근거로 질문에 답변하세요.\n\
         조문에서 답을 찾을 수 없다면 모른다고 답하세요. 답변은 세 문장 이내로 간결하게 작성하세요.\n",
    );

    if use_few_shot {
        prompt.push_str("\n[답변 예시]\n");
        for (q, a) in ANSWER_EXAMPLES.iter() {
            prompt.push_str(&format!("질문: {}\n답변: {}\n\n", q, a));
        }
    }

    if !history_context.trim().is_empty() {
        prompt.push_str(&format!("\n[이전 대화 맥락]\n{}\n", history_context.trim()));
    }

    prompt.push_str("\n[검색된 조문]\n");
    if chunks.is_empty() {
        prompt.push_str("(검색된 조문 없음)\n");
    }
    for (i, retrieved) in chunks.iter().enumerate() {
        prompt.push_str(&format!("({}) {}\n\n", i + 1, retrieved.chunk.text.trim()));
    }

    prompt.push_str(&format!("\n질문: {}\n답변:", question));
    prompt
}

/// 응답에서 따옴표와 접두어를 정리
pub fn clean_rewritten_query(raw: &str) -> String {
    let line = raw.trim().lines().next().unwrap_or_default().trim();
    let line = line
        .strip_prefix("개선된 질문:")
        .map(str::trim)
        .unwrap_or(line);
    line.trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim()
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
