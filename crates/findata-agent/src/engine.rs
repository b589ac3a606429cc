//! Agent engine: the generate → execute → observe → repair loop
//!
//! One state machine drives every frontend; the observable difference
//! between streaming and non-streaming consumers is only which [`EventSink`]
//! they pass in. Every run ends with exactly one terminal
//! [`LifecycleEvent::Result`], mirrored in the returned [`RunOutcome`].

use crate::config::AgentConfig;
use crate::error::Result;
use crate::event::{EventSink, LifecycleEvent};
use crate::fallback::FallbackScript;
use crate::intent::{self, Intent};
use crate::knowledge;
use crate::locator;
use crate::prompts;
use crate::runner::ScriptRunner;
use crate::symbols::{StaticSymbolTable, SymbolLookup};
use findata_llm::{CompletionRequest, LLMProvider, Message};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

/// Responses that arrive unfenced and shorter than this are treated as a
/// conversational answer rather than a program
const CONVERSATIONAL_MAX_CHARS: usize = 80;

const CANCELLED_MESSAGE: &str = "任务已取消。";

/// Cooperative cancellation token checked between yield points
///
/// Setting the flag never interrupts an in-flight subprocess wait; the run
/// observes it at the next chunk or attempt boundary.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal outcome of one run, also emitted as the final event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Whether the run succeeded
    pub success: bool,
    /// Artifact path or free text
    pub payload: String,
}

/// Orchestrates intent resolution, code generation, execution and repair
pub struct AgentEngine {
    provider: Arc<dyn LLMProvider>,
    config: Arc<AgentConfig>,
    runner: ScriptRunner,
    symbols: Box<dyn SymbolLookup>,
    knowledge: String,
}

impl AgentEngine {
    /// Create an engine; loads the knowledge context from disk once
    pub fn new(provider: Arc<dyn LLMProvider>, config: Arc<AgentConfig>) -> Self {
        let runner = ScriptRunner::new(config.clone());
        let knowledge = knowledge::load_context(&config.knowledge_dir);
        Self {
            provider,
            config,
            runner,
            symbols: Box::new(StaticSymbolTable::new()),
            knowledge,
        }
    }

    /// Replace the script runner (e.g., a different interpreter in tests)
    pub fn with_runner(mut self, runner: ScriptRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the symbol table
    pub fn with_symbols(mut self, symbols: impl SymbolLookup + 'static) -> Self {
        self.symbols = Box::new(symbols);
        self
    }

    /// Run one request end to end
    ///
    /// Emits lifecycle events into `sink` as they happen and returns the
    /// terminal outcome, which is also the last emitted event.
    #[instrument(skip_all, fields(model = %self.config.model))]
    pub async fn run(&self, text: &str, sink: &dyn EventSink, stop: &StopFlag) -> RunOutcome {
        if stop.is_stopped() {
            return self.finish(sink, false, CANCELLED_MESSAGE.to_string());
        }

        let hints = if self.config.use_llm_extraction {
            intent::extract_hints(
                self.provider.as_ref(),
                &self.config.model,
                self.config.max_tokens,
                text,
            )
            .await
        } else {
            None
        };

        let intent = intent::resolve(text, self.symbols.as_ref(), hints.as_ref());
        debug!(
            code = ?intent.entity_code,
            start = ?intent.start_date,
            end = ?intent.end_date,
            "Resolved intent"
        );

        let expected = self.expected_artifacts(&intent);
        let suggested = expected
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.config.exports_dir.display().to_string());

        let system = match prompts::render_system_prompt(&self.knowledge, &self.config) {
            Ok(system) => system,
            Err(e) => return self.finish(sink, false, e.to_string()),
        };

        let mut conversation = vec![Message::user(prompts::build_user_prompt(
            &intent, &suggested,
        ))];
        let run_stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f").to_string();

        for attempt in 1..=self.config.max_attempts {
            if stop.is_stopped() {
                return self.finish(sink, false, CANCELLED_MESSAGE.to_string());
            }

            let request = CompletionRequest::builder(&self.config.model)
                .messages(conversation.clone())
                .system(system.clone())
                .max_tokens(self.config.max_tokens)
                .temperature(self.config.temperature)
                .build();

            // Backend errors are infrastructure failures, never repaired
            let response = match self.stream_thought(request, sink, stop).await {
                Ok(Some(response)) => response,
                Ok(None) => return self.finish(sink, false, CANCELLED_MESSAGE.to_string()),
                Err(e) => {
                    sink.emit(LifecycleEvent::Error(e.to_string()));
                    return self.finish(sink, false, e.to_string());
                }
            };

            sink.emit(LifecycleEvent::Thought(response.clone()));
            conversation.push(Message::assistant(response.clone()));

            let extracted = prompts::extract_code(&response);
            if !extracted.fenced && extracted.code.chars().count() < CONVERSATIONAL_MAX_CHARS {
                // Clarification or refusal, not a program
                return self.finish(sink, true, extracted.code);
            }

            sink.emit(LifecycleEvent::Execution(extracted.code.clone()));
            let script_name = format!("agent_{run_stamp}_attempt{attempt}.py");

            let result = match self.runner.execute(&extracted.code, &script_name).await {
                Ok(result) => result,
                Err(e) => {
                    sink.emit(LifecycleEvent::Error(e.to_string()));
                    return self.finish(sink, false, e.to_string());
                }
            };

            if result.success {
                info!(attempt, elapsed = ?result.elapsed, "Execution succeeded");
                let payload = self.resolve_artifact(&intent, &expected, &result.output).await;
                return self.finish(sink, true, payload);
            }

            warn!(attempt, "Execution failed");
            sink.emit(LifecycleEvent::Error(result.output.clone()));

            if attempt == self.config.max_attempts {
                return self.finish(
                    sink,
                    false,
                    format!(
                        "连续 {} 次尝试均失败。最后错误：\n{}",
                        self.config.max_attempts, result.output
                    ),
                );
            }

            conversation.push(Message::user(prompts::build_repair_prompt(&result.output)));
        }

        // max_attempts >= 1 is enforced by config validation
        self.finish(sink, false, "没有可执行的尝试。".to_string())
    }

    /// Consume one streamed completion, forwarding deltas as thought chunks
    ///
    /// `Ok(None)` means the run was cancelled mid-stream.
    async fn stream_thought(
        &self,
        request: CompletionRequest,
        sink: &dyn EventSink,
        stop: &StopFlag,
    ) -> Result<Option<String>> {
        let mut stream = self.provider.complete_stream(request).await?;
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            if stop.is_stopped() {
                return Ok(None);
            }
            let chunk = chunk?;
            if !chunk.delta.is_empty() {
                sink.emit(LifecycleEvent::ThoughtChunk(chunk.delta.clone()));
                full.push_str(&chunk.delta);
            }
        }

        Ok(Some(full))
    }

    /// Locate the deliverable, trying the deterministic fallback when the
    /// generated code ran clean but produced nothing findable
    async fn resolve_artifact(
        &self,
        intent: &Intent,
        expected: &[PathBuf],
        output: &str,
    ) -> String {
        if let Some(path) = locator::locate(expected, output) {
            return path.display().to_string();
        }

        if self.config.enable_fallback {
            if let Some(path) = self.run_fallback(intent, expected).await {
                return path.display().to_string();
            }
        }

        // Low-confidence success: report the raw output rather than failing
        // a run whose code exited clean
        warn!("No artifact located, reporting raw execution output");
        output.to_string()
    }

    async fn run_fallback(&self, intent: &Intent, expected: &[PathBuf]) -> Option<PathBuf> {
        let script = match FallbackScript::build(intent, &self.config) {
            Ok(script) => script,
            Err(e) => {
                debug!("Fallback not applicable: {e}");
                return None;
            }
        };

        info!("Running deterministic fallback script");
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let result = match self.runner.execute(&script, &format!("fallback_{stamp}.py")).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Fallback execution failed to start: {e}");
                return None;
            }
        };

        if !result.success {
            warn!("Fallback script failed: {}", result.output);
            return None;
        }
        locator::locate(expected, &result.output)
    }

    /// Artifact paths the run is expected to produce, primary first
    fn expected_artifacts(&self, intent: &Intent) -> Vec<PathBuf> {
        let (Some(code), Some(start), Some(end)) =
            (&intent.entity_code, &intent.start_date, &intent.end_date)
        else {
            return Vec::new();
        };

        let stem = format!("{}_{start}_{end}", code.replace('.', "_"));
        let mut paths = Vec::new();
        if intent.actions.export {
            paths.push(self.config.exports_dir.join(format!("{stem}.xlsx")));
        }
        if intent.actions.plot {
            paths.push(self.config.exports_dir.join(format!("{stem}.png")));
        }
        paths
    }

    /// Emit the single terminal event and return the matching outcome
    fn finish(&self, sink: &dyn EventSink, success: bool, payload: String) -> RunOutcome {
        sink.emit(LifecycleEvent::Result {
            success,
            payload: payload.clone(),
        });
        RunOutcome { success, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CollectingSink;
    use async_trait::async_trait;
    use findata_llm::{CompletionResponse, LLMError, TokenUsage};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Provider replaying a fixed sequence of responses
    struct ScriptedProvider {
        responses: Mutex<VecDeque<std::result::Result<String, LLMError>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<std::result::Result<String, LLMError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
            }
        }

        fn replying(text: &str) -> Self {
            Self::new((0..8).map(|_| Ok(text.to_string())).collect())
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> findata_llm::Result<CompletionResponse> {
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()));
            next.map(|text| CompletionResponse {
                message: Message::assistant(text),
                usage: TokenUsage::default(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn test_engine(dir: &std::path::Path, provider: ScriptedProvider) -> AgentEngine {
        let config = Arc::new(
            AgentConfig::builder()
                .project_root(dir)
                .interpreter("sh")
                .exec_timeout(Duration::from_secs(10))
                .use_llm_extraction(false)
                .enable_fallback(false)
                .build()
                .unwrap(),
        );
        let runner = ScriptRunner::new(config.clone()).with_preamble("");
        AgentEngine::new(Arc::new(provider), config).with_runner(runner)
    }

    fn count_matching(events: &[LifecycleEvent], pred: impl Fn(&LifecycleEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    #[tokio::test]
    async fn test_retries_bounded_and_single_terminal_event() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::replying("计划。\n```python\nexit 1\n```");
        let engine = test_engine(dir.path(), provider);
        let sink = CollectingSink::new();

        let outcome = engine.run("导出600519.SH的数据", &sink, &StopFlag::new()).await;

        assert!(!outcome.success);
        assert!(outcome.payload.contains('3'));

        let events = sink.events();
        assert_eq!(
            count_matching(&events, |e| matches!(e, LifecycleEvent::Execution(_))),
            3
        );
        assert_eq!(count_matching(&events, |e| e.is_terminal()), 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_output_tag_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("report.xlsx");
        let code = format!(
            "printf data > {p}\necho \"OUTPUT_PATH:{p}\"",
            p = artifact.display()
        );
        let provider = ScriptedProvider::replying(&format!("写文件。\n```python\n{code}\n```"));
        let engine = test_engine(dir.path(), provider);
        let sink = CollectingSink::new();

        let outcome = engine.run("导出数据", &sink, &StopFlag::new()).await;

        assert!(outcome.success);
        assert_eq!(outcome.payload, artifact.display().to_string());
        assert!(artifact.exists());
    }

    #[tokio::test]
    async fn test_second_attempt_repairs_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("fixed.xlsx");
        let good = format!(
            "```python\nprintf ok > {p}\necho \"OUTPUT_PATH:{p}\"\n```",
            p = artifact.display()
        );
        let provider = ScriptedProvider::new(vec![
            Ok("```python\nexit 7\n```".to_string()),
            Ok(good),
        ]);
        let engine = test_engine(dir.path(), provider);
        let sink = CollectingSink::new();

        let outcome = engine.run("导出数据", &sink, &StopFlag::new()).await;

        assert!(outcome.success);
        let events = sink.events();
        assert_eq!(
            count_matching(&events, |e| matches!(e, LifecycleEvent::Execution(_))),
            2
        );
        assert_eq!(
            count_matching(&events, |e| matches!(e, LifecycleEvent::Error(_))),
            1
        );
    }

    #[tokio::test]
    async fn test_short_unfenced_response_is_conversational() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::replying("请补充股票代码和日期范围。");
        let engine = test_engine(dir.path(), provider);
        let sink = CollectingSink::new();

        let outcome = engine.run("导出数据", &sink, &StopFlag::new()).await;

        assert!(outcome.success);
        assert_eq!(outcome.payload, "请补充股票代码和日期范围。");
        let events = sink.events();
        assert_eq!(
            count_matching(&events, |e| matches!(e, LifecycleEvent::Execution(_))),
            0
        );
    }

    #[tokio::test]
    async fn test_provider_error_fails_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![Err(LLMError::RequestFailed(
            "connection refused".to_string(),
        ))]);
        let engine = test_engine(dir.path(), provider);
        let sink = CollectingSink::new();

        let outcome = engine.run("导出数据", &sink, &StopFlag::new()).await;

        assert!(!outcome.success);
        let events = sink.events();
        assert_eq!(
            count_matching(&events, |e| matches!(e, LifecycleEvent::Execution(_))),
            0
        );
        assert_eq!(count_matching(&events, |e| e.is_terminal()), 1);
    }

    #[tokio::test]
    async fn test_stop_flag_cancels_before_work() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::replying("```python\necho x\n```");
        let engine = test_engine(dir.path(), provider);
        let sink = CollectingSink::new();

        let stop = StopFlag::new();
        stop.stop();
        let outcome = engine.run("导出数据", &sink, &stop).await;

        assert!(!outcome.success);
        assert_eq!(sink.events().len(), 1);
        assert!(sink.events()[0].is_terminal());
    }

    #[tokio::test]
    async fn test_expected_path_located_without_tag() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir
            .path()
            .join("workspace/exports/600519_SH_20230101_20230131.xlsx");
        let code = format!(
            "mkdir -p {d}\nprintf data > {p}",
            d = expected.parent().unwrap().display(),
            p = expected.display()
        );
        let provider = ScriptedProvider::replying(&format!("```python\n{code}\n```"));
        let engine = test_engine(dir.path(), provider);
        let sink = CollectingSink::new();

        let outcome = engine
            .run(
                "导出600519.SH在2023年1月1日至2023年1月31日的日线",
                &sink,
                &StopFlag::new(),
            )
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.payload, expected.display().to_string());
    }

    #[tokio::test]
    async fn test_clean_run_without_artifact_reports_raw_output() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::replying("```python\necho '均价为 1700.5 元'\n```");
        let engine = test_engine(dir.path(), provider);
        let sink = CollectingSink::new();

        let outcome = engine.run("算一下均价", &sink, &StopFlag::new()).await;

        assert!(outcome.success);
        assert!(outcome.payload.contains("1700.5"));
    }
}
