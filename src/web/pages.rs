//! 내장 HTML 페이지

/// 사용자 채팅 페이지
pub const USER_PAGE: &str = r#"<!DOCTYPE html>
<html lang="ko">
<head>
<meta charset="utf-8">
<title>소득세 RAG 챗봇</title>
<style>
body { font-family: sans-serif; max-width: 860px; margin: 2rem auto; }
#log { border: 1px solid #ccc; padding: 1rem; height: 480px; overflow-y: auto; white-space: pre-wrap; }
.user { color: #1a5fb4; margin-top: .8rem; }
.bot { color: #222; }
.meta { color: #888; font-size: .85rem; }
form { display: flex; gap: .5rem; margin-top: .5rem; }
input[type=text] { flex: 1; }
</style>
</head>
<body>
<h1>💰 소득세 RAG 챗봇</h1>
<details>
  <summary>⚙️ 설정</summary>
  <p>API 키 (비우면 서버 설정 사용): <input id="key" type="password"></p>
  <p>임베딩:
    <select id="embedding"><option value="gemini">Google Gemini</option><option value="local">로컬 다국어 모델</option></select>
    <label><input id="opt" type="checkbox"> 쿼리 최적화</label>
    <label><input id="fewshot" type="checkbox" checked> 답변 예시</label>
  </p>
  <button id="start">새 대화 시작</button>
  <button id="reset">대화 초기화</button>
</details>
<div id="log"></div>
<form id="ask"><input id="msg" type="text" placeholder="소득세에 대해 질문하세요 (help: 명령어 목록)"><button>전송</button></form>
<script>
let sessionId = null;
const log = document.getElementById('log');
function add(cls, text) {
  const div = document.createElement('div');
  div.className = cls; div.textContent = text;
  log.appendChild(div); log.scrollTop = log.scrollHeight;
}
async function post(url, body) {
  const res = await fetch(url, { method: 'POST', headers: { 'content-type': 'application/json' }, body: JSON.stringify(body || {}) });
  return res.json();
}
async function start() {
  const body = {
    embedding: document.getElementById('embedding').value,
    use_query_optimization: document.getElementById('opt').checked,
    use_few_shot: document.getElementById('fewshot').checked,
  };
  const key = document.getElementById('key').value.trim();
  if (key) body.api_key = key;
  await closeSession();
  add('meta', '⏳ 세션 준비 중...');
  const data = await post('/api/session', body);
  if (!data.success) { add('meta', data.error); return; }
  sessionId = data.session_id;
  add('meta', '✅ 준비 완료');
}
async function closeSession(keepalive) {
  if (!sessionId) return;
  const id = sessionId;
  sessionId = null;
  await fetch('/api/session/' + id, { method: 'DELETE', keepalive: !!keepalive }).catch(() => {});
}
document.getElementById('start').onclick = start;
document.getElementById('reset').onclick = async () => {
  if (!sessionId) return;
  const data = await post('/api/session/' + sessionId + '/reset');
  if (data.success) add('meta', `🧹 대화 ${data.removed}개 삭제됨`);
  else { sessionId = null; add('meta', data.error); }
};
window.addEventListener('pagehide', () => closeSession(true));
document.getElementById('ask').onsubmit = async (e) => {
  e.preventDefault();
  const input = document.getElementById('msg');
  const message = input.value.trim();
  if (!message) return;
  if (!sessionId) await start();
  if (!sessionId) return;
  input.value = '';
  add('user', '🙋 ' + message);
  const data = await post('/api/chat', { session_id: sessionId, message });
  if (data.error) { add('meta', data.error); return; }
  const reply = data.reply;
  if (reply.kind === 'command') { add('meta', reply.message); return; }
  add('bot', '🤖 ' + reply.answer);
  if (reply.optimization_used && reply.improved_query !== reply.original_query) add('meta', '🔍 개선된 질문: ' + reply.improved_query);
  reply.sources.forEach((s, i) => add('meta', `📄 [${i + 1}] (${s.score.toFixed(3)}) ${s.chunk.text.slice(0, 120)}`));
  add('meta', `⏱️ ${(reply.elapsed_ms / 1000).toFixed(1)}초`);
};
</script>
</body>
</html>
"#;

/// 관리자 페이지
pub const ADMIN_PAGE: &str = r#"<!DOCTYPE html>
<html lang="ko">
<head>
<meta charset="utf-8">
<title>소득세 RAG 관리자</title>
<style>
body { font-family: sans-serif; max-width: 960px; margin: 2rem auto; }
pre { background: #f4f4f4; padding: 1rem; max-height: 420px; overflow: auto; }
button { margin: .2rem; }
</style>
</head>
<body>
<h1>🛠️ 벡터 DB 관리</h1>
<p>임베딩:
  <select id="embedding"><option value="gemini">Google Gemini</option><option value="local">로컬 다국어 모델</option></select>
</p>
<p>
  <button data-method="GET" data-path="/api/db/status">📊 상태</button>
  <button data-method="GET" data-path="/api/db/backups">💿 백업 목록</button>
  <button data-method="POST" data-path="/api/db/backup">💾 백업</button>
  <button data-method="POST" data-path="/api/db/rebuild" data-confirm="재구축하시겠습니까?">🔄 재구축</button>
  <button data-method="DELETE" data-path="/api/db" data-confirm="정말 삭제하시겠습니까?">🗑️ 삭제</button>
  <button data-method="POST" data-path="/api/db/cache/clear">🧹 캐시 해제</button>
  <button data-method="GET" data-path="/api/resources">📦 리소스</button>
</p>
<p>복원할 백업 이름: <input id="backup" type="text" size="40"> <button id="restore">♻️ 복원</button></p>
<pre id="out"></pre>
<script>
const out = document.getElementById('out');
const embedding = () => document.getElementById('embedding').value;
async function call(method, path, body) {
  const url = path + (path.includes('?') ? '&' : '?') + 'embedding=' + embedding();
  const opts = { method, headers: { 'content-type': 'application/json' } };
  if (body) opts.body = JSON.stringify(body);
  out.textContent = '⏳ 처리 중...';
  const res = await fetch(url, opts);
  out.textContent = JSON.stringify(await res.json(), null, 2);
}
document.querySelectorAll('button[data-path]').forEach((b) => {
  b.onclick = () => {
    if (b.dataset.confirm && !confirm(b.dataset.confirm)) return;
    call(b.dataset.method, b.dataset.path);
  };
});
document.getElementById('restore').onclick = () => {
  const name = document.getElementById('backup').value.trim();
  if (name && confirm(name + ' 백업으로 복원하시겠습니까?')) call('POST', '/api/db/restore', { embedding: embedding(), name });
};
</script>
</body>
</html>
"#;
