//! One parameterised pipeline for every user action.
//!
//! Report: Capturing -> Requesting -> Done, with Persisting running in the
//! background once the result is back.
//! Food: EncodingImage -> Requesting -> Done.
//! Chat: Requesting -> Done.
//!
//! Stages run strictly in order. A stage that cannot produce its output ends
//! the action with [`Failed`]. Provider failures are not stage failures: they
//! come back as an [`AiCallResult`] with `succeeded == false`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ai::{GeminiTransport, GenerationConfig, RetryingCaller};
use crate::auth::User;
use crate::config::{Config, DEFAULT_MODEL};
use crate::error::Result;
use crate::history::{DocumentStore, NewReport, OrderField, ReportRecord};
use crate::language::Language;
use crate::ocr::{Ocr, TesseractOcr};
use crate::prompt::PromptBuilder;
use crate::rate_limiter::RateLimiter;
use crate::render::{render, render_error, AiCallResult};
use crate::request::{AnalysisRequest, RequestKind};
use crate::state::ConversationContext;
use crate::storage::ObjectStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Idle,
    Capturing,
    EncodingImage,
    Requesting,
    Persisting,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Capturing => "capturing",
            Stage::EncodingImage => "encoding_image",
            Stage::Requesting => "requesting",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

/// Terminal failure of an action, with the stage it happened in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Failed {
    pub stage: Stage,
    pub message: String,
}

impl Failed {
    fn at(stage: Stage, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(stage = stage.as_str(), %message, "action failed");
        Self { stage, message }
    }
}

/// What happened to the history write after an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Persistence {
    /// The write is still running in the background.
    Pending,
    Saved,
    /// Nobody signed in, or the analysis itself failed.
    Skipped,
    Failed(String),
}

#[derive(Debug)]
pub struct ReportOutcome {
    pub file_name: String,
    pub result: AiCallResult,
    pub source_text: String,
    /// Context for follow-up chat. `None` unless the analysis succeeded.
    pub context: Option<ConversationContext>,
    pub persistence: Persistence,
    /// Background history write, present while `persistence` is `Pending`.
    pub save: Option<JoinHandle<Persistence>>,
}

impl ReportOutcome {
    /// Wait for the background history write and record its result.
    pub async fn settle(&mut self) -> &Persistence {
        if let Some(save) = self.save.take() {
            self.persistence = save
                .await
                .unwrap_or_else(|e| Persistence::Failed(format!("save task failed: {}", e)));
        }
        &self.persistence
    }
}

pub struct Orchestrator {
    caller: RetryingCaller,
    prompts: PromptBuilder,
    ocr: Arc<dyn Ocr>,
    store: Arc<dyn DocumentStore>,
    storage: Option<Arc<dyn ObjectStorage>>,
    text_model: String,
    vision_model: String,
    max_retries: u32,
}

impl Orchestrator {
    pub fn new(caller: RetryingCaller, ocr: Arc<dyn Ocr>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            caller,
            prompts: PromptBuilder::default(),
            ocr,
            store,
            storage: None,
            text_model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            max_retries: 3,
        }
    }

    /// Wire the production collaborators described by `config`.
    ///
    /// The limiter is passed in so it survives rebuilding the orchestrator
    /// (for example after the API key changes).
    pub fn from_config(
        config: &Config,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let transport = Arc::new(GeminiTransport::new(&config.base_url, config.api_key.as_deref()));
        let caller = RetryingCaller::new(transport, limiter);
        let ocr = Arc::new(TesseractOcr::new(&config.ocr_command, &config.ocr_language));

        Self::new(caller, ocr, store)
            .with_models(&config.model, config.vision_model())
            .with_max_retries(config.max_retries)
            .with_prompts(PromptBuilder::new(GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            }))
    }

    pub fn with_models(mut self, text_model: &str, vision_model: &str) -> Self {
        self.text_model = text_model.to_string();
        self.vision_model = vision_model.to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    fn model_for(&self, kind: RequestKind) -> &str {
        match kind {
            RequestKind::FoodImage => &self.vision_model,
            RequestKind::Report | RequestKind::Chat => &self.text_model,
        }
    }

    /// Prompt, call and render one request.
    ///
    /// Only input validation is an `Err`; every provider or transport failure
    /// is rendered into the returned result.
    pub async fn request(&self, request: &AnalysisRequest) -> Result<AiCallResult> {
        let kind = request.kind();
        let payload = self.prompts.build(request)?;
        let model = self.model_for(kind);

        debug!(kind = kind.as_str(), model, "requesting analysis");
        let result = match self.caller.call(model, &payload, self.max_retries).await {
            Ok(reply) => render(kind, &reply),
            Err(err) => render_error(kind, &err),
        };
        info!(kind = kind.as_str(), succeeded = result.succeeded, "analysis finished");
        Ok(result)
    }

    pub async fn analyze_report(
        &self,
        user: Option<&User>,
        image: &Path,
        language: Language,
    ) -> std::result::Result<ReportOutcome, Failed> {
        let file_name = display_name(image);

        debug!(stage = Stage::Capturing.as_str(), file = %file_name);
        let source_text = self
            .ocr
            .recognize_text(image)
            .await
            .map_err(|e| Failed::at(Stage::Capturing, e.to_string()))?;

        debug!(stage = Stage::Requesting.as_str(), chars = source_text.chars().count());
        let request = AnalysisRequest::report(source_text.clone(), language);
        let result = self
            .request(&request)
            .await
            .map_err(|e| Failed::at(Stage::Capturing, e.to_string()))?;
        let context = if result.succeeded {
            ConversationContext::from_report_text(&file_name, &source_text)
        } else {
            None
        };

        let (persistence, save) = match user {
            Some(user) if result.succeeded => {
                debug!(stage = Stage::Persisting.as_str(), user = %user.id);
                let report =
                    NewReport::new(&file_name, language.code(), &source_text, &result.html);
                let save = tokio::spawn(persist(
                    self.store.clone(),
                    self.storage.clone(),
                    user.id.clone(),
                    image.to_path_buf(),
                    report,
                ));
                (Persistence::Pending, Some(save))
            }
            _ => (Persistence::Skipped, None),
        };

        debug!(stage = Stage::Done.as_str(), file = %file_name);
        Ok(ReportOutcome {
            file_name,
            result,
            source_text,
            context,
            persistence,
            save,
        })
    }

    pub async fn scan_food(
        &self,
        image: &Path,
        language: Language,
    ) -> std::result::Result<AiCallResult, Failed> {
        debug!(stage = Stage::EncodingImage.as_str(), image = %image.display());
        let mime_type = image_mime_type(image).ok_or_else(|| {
            Failed::at(
                Stage::EncodingImage,
                "Unsupported image type. Use a JPEG, PNG, WEBP or GIF photo.",
            )
        })?;
        let bytes = tokio::fs::read(image).await.map_err(|e| {
            Failed::at(
                Stage::EncodingImage,
                format!("Could not read {}: {}", image.display(), e),
            )
        })?;

        let request = AnalysisRequest::food_image(bytes, mime_type, language);
        self.request(&request)
            .await
            .map_err(|e| Failed::at(Stage::EncodingImage, e.to_string()))
    }

    pub async fn chat(
        &self,
        context: Option<&ConversationContext>,
        message: &str,
        language: Language,
    ) -> std::result::Result<AiCallResult, Failed> {
        let request = AnalysisRequest::chat(message, context.cloned(), language);
        self.request(&request)
            .await
            .map_err(|e| Failed::at(Stage::Requesting, e.to_string()))
    }

    /// The user's saved reports, newest first.
    pub async fn history(&self, user: &User) -> Result<Vec<ReportRecord>> {
        self.store
            .list_records(&user.id, OrderField::CreatedAt, true)
            .await
    }
}

/// Best-effort history write. Never fails the action.
async fn persist(
    store: Arc<dyn DocumentStore>,
    storage: Option<Arc<dyn ObjectStorage>>,
    user_id: String,
    image: PathBuf,
    mut report: NewReport,
) -> Persistence {
    if let Some(storage) = storage {
        match storage.upload(&image).await {
            Ok(url) => report.image_url = Some(url),
            Err(err) => warn!(error = %err, "image upload failed, saving report without it"),
        }
    }

    match store.append_record(&user_id, report).await {
        Ok(record) => {
            info!(user = %user_id, id = record.id, "report saved to history");
            Persistence::Saved
        }
        Err(err) => {
            warn!(user = %user_id, error = %err, "could not save report to history");
            Persistence::Failed(err.to_string())
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::retry::tests::ScriptedTransport;
    use crate::ai::{HttpReply, TransportError};
    use crate::error::Error;
    use crate::history::SqliteHistory;
    use crate::prompt::REPORT_SECTIONS;
    use crate::render::VISION_UNAVAILABLE;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedOcr(std::result::Result<String, String>);

    #[async_trait]
    impl Ocr for FixedOcr {
        async fn recognize_text(&self, _image: &Path) -> Result<String> {
            self.0.clone().map_err(Error::Ocr)
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn append_record(&self, _user_id: &str, _report: NewReport) -> Result<ReportRecord> {
            Err(Error::Persistence("disk full".to_string()))
        }

        async fn list_records(
            &self,
            _user_id: &str,
            _order_by: OrderField,
            _descending: bool,
        ) -> Result<Vec<ReportRecord>> {
            Err(Error::Persistence("disk full".to_string()))
        }
    }

    struct RecordingStorage {
        uploads: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ObjectStorage for RecordingStorage {
        async fn upload(&self, file: &Path) -> Result<String> {
            if self.fail {
                return Err(Error::Storage("bucket unavailable".to_string()));
            }
            let url = format!("mem://{}", display_name(file));
            self.uploads.lock().unwrap().push(url.clone());
            Ok(url)
        }
    }

    fn ok_reply(text: &str) -> std::result::Result<HttpReply, TransportError> {
        let body = json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] });
        Ok(HttpReply::new(200, body.to_string()))
    }

    fn report_html() -> String {
        let body: String = REPORT_SECTIONS
            .iter()
            .map(|s| format!("<h3>{}</h3><p>ok</p>", s))
            .collect();
        format!("```html\n<div>{}</div>\n```", body)
    }

    fn user() -> User {
        User {
            id: "user-1".to_string(),
            email: "a@example.com".to_string(),
        }
    }

    fn orchestrator(
        transport: Arc<ScriptedTransport>,
        ocr_text: &str,
        store: Arc<dyn DocumentStore>,
    ) -> Orchestrator {
        let limiter = Arc::new(RateLimiter::new(Duration::ZERO));
        let caller = RetryingCaller::new(transport, limiter);
        Orchestrator::new(caller, Arc::new(FixedOcr(Ok(ocr_text.to_string()))), store)
            .with_models("text-model", "vision-model")
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_ocr_text_never_reaches_network() {
        let transport = ScriptedTransport::new(vec![ok_reply("unused")]);
        let store = Arc::new(SqliteHistory::in_memory().unwrap());
        let orch = orchestrator(transport.clone(), "ab", store);

        let failed = orch
            .analyze_report(Some(&user()), Path::new("scan.jpg"), Language::English)
            .await
            .unwrap_err();
        assert_eq!(failed.stage, Stage::Capturing);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ocr_failure_is_capturing_failure() {
        let transport = ScriptedTransport::new(vec![]);
        let limiter = Arc::new(RateLimiter::new(Duration::ZERO));
        let orch = Orchestrator::new(
            RetryingCaller::new(transport.clone(), limiter),
            Arc::new(FixedOcr(Err("tesseract missing".to_string()))),
            Arc::new(SqliteHistory::in_memory().unwrap()),
        );

        let failed = orch
            .analyze_report(None, Path::new("scan.jpg"), Language::English)
            .await
            .unwrap_err();
        assert_eq!(failed.stage, Stage::Capturing);
        assert!(failed.message.contains("tesseract missing"));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_flow_saves_and_sets_context() {
        let transport = ScriptedTransport::new(vec![ok_reply(&report_html())]);
        let store = Arc::new(SqliteHistory::in_memory().unwrap());
        let orch = orchestrator(transport.clone(), "Glucose: 250 mg/dL, HbA1c: 8.2%", store.clone());

        let mut outcome = orch
            .analyze_report(Some(&user()), Path::new("/tmp/scan.jpg"), Language::English)
            .await
            .unwrap();

        assert!(outcome.result.succeeded);
        for section in REPORT_SECTIONS {
            assert!(outcome.result.html.contains(section));
        }
        assert!(!outcome.result.html.contains("```"));
        assert_eq!(outcome.persistence, Persistence::Pending);
        assert_eq!(outcome.settle().await, &Persistence::Saved);
        assert!(outcome.save.is_none());
        assert_eq!(outcome.file_name, "scan.jpg");
        assert_eq!(
            outcome.context.as_ref().unwrap().excerpt(),
            "Glucose: 250 mg/dL, HbA1c: 8.2%"
        );

        let prompt = transport.requests()[0].prompt_text().unwrap().to_string();
        assert!(prompt.contains("250 mg/dL"));
        assert!(prompt.contains("8.2%"));
        assert_eq!(transport.models(), vec!["text-model"]);

        let records = orch.history(&user()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "scan.jpg");
        assert_eq!(records[0].language, "en");
        assert_eq!(records[0].analysis_html, outcome.result.html);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_keeps_result() {
        let transport = ScriptedTransport::new(vec![ok_reply("<div>analysis</div>")]);
        let orch = orchestrator(transport, "Glucose: 250 mg/dL", Arc::new(BrokenStore));

        let mut outcome = orch
            .analyze_report(Some(&user()), Path::new("scan.jpg"), Language::English)
            .await
            .unwrap();

        assert!(outcome.result.succeeded);
        assert_eq!(outcome.result.html, "<div>analysis</div>");
        match outcome.settle().await {
            Persistence::Failed(reason) => assert!(reason.contains("disk full")),
            other => panic!("unexpected persistence: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_anonymous_or_failed_analysis_skips_persistence() {
        let transport = ScriptedTransport::new(vec![
            ok_reply("<div>analysis</div>"),
            Ok(HttpReply::new(500, "{}")),
        ]);
        let store = Arc::new(SqliteHistory::in_memory().unwrap());
        let orch = orchestrator(transport, "Glucose: 250 mg/dL", store);

        let anonymous = orch
            .analyze_report(None, Path::new("scan.jpg"), Language::English)
            .await
            .unwrap();
        assert_eq!(anonymous.persistence, Persistence::Skipped);

        let failed = orch
            .analyze_report(Some(&user()), Path::new("scan.jpg"), Language::English)
            .await
            .unwrap();
        assert!(!failed.result.succeeded);
        assert_eq!(failed.persistence, Persistence::Skipped);
        assert!(failed.save.is_none());
        assert!(orch.history(&user()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_analysis_yields_no_chat_context() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(500, "{}"))]);
        let orch = orchestrator(
            transport,
            "Glucose: 250 mg/dL",
            Arc::new(SqliteHistory::in_memory().unwrap()),
        );

        let outcome = orch
            .analyze_report(Some(&user()), Path::new("scan.jpg"), Language::English)
            .await
            .unwrap();
        assert!(!outcome.result.succeeded);
        assert!(outcome.context.is_none());
    }

    struct SlowStore;

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn append_record(&self, _user_id: &str, report: NewReport) -> Result<ReportRecord> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ReportRecord {
                id: 1,
                file_name: report.file_name,
                language: report.language,
                ocr_text_snippet: report.ocr_text_snippet,
                analysis_html: report.analysis_html,
                image_url: report.image_url,
                created_at: chrono::Utc::now(),
            })
        }

        async fn list_records(
            &self,
            _user_id: &str,
            _order_by: OrderField,
            _descending: bool,
        ) -> Result<Vec<ReportRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_does_not_hold_back_result() {
        let transport = ScriptedTransport::new(vec![ok_reply("<div>analysis</div>")]);
        let orch = orchestrator(transport, "Glucose: 250 mg/dL", Arc::new(SlowStore));

        let start = tokio::time::Instant::now();
        let mut outcome = orch
            .analyze_report(Some(&user()), Path::new("scan.jpg"), Language::English)
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(outcome.result.succeeded);
        assert_eq!(outcome.persistence, Persistence::Pending);

        assert_eq!(outcome.settle().await, &Persistence::Saved);
        assert!(start.elapsed() >= Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_url_is_recorded() {
        let transport = ScriptedTransport::new(vec![ok_reply("<div>a</div>"), ok_reply("<div>b</div>")]);
        let store = Arc::new(SqliteHistory::in_memory().unwrap());
        let storage = Arc::new(RecordingStorage { uploads: Mutex::new(Vec::new()), fail: false });
        let orch = orchestrator(transport, "Glucose: 250 mg/dL", store.clone())
            .with_storage(storage.clone());

        orch.analyze_report(Some(&user()), Path::new("scan.jpg"), Language::English)
            .await
            .unwrap()
            .settle()
            .await;
        let records = orch.history(&user()).await.unwrap();
        assert_eq!(records[0].image_url.as_deref(), Some("mem://scan.jpg"));
        assert_eq!(storage.uploads.lock().unwrap().len(), 1);

        let broken = Arc::new(RecordingStorage { uploads: Mutex::new(Vec::new()), fail: true });
        let transport = ScriptedTransport::new(vec![ok_reply("<div>c</div>")]);
        let orch = orchestrator(transport, "Glucose: 250 mg/dL", store).with_storage(broken);
        let mut outcome = orch
            .analyze_report(Some(&user()), Path::new("other.jpg"), Language::English)
            .await
            .unwrap();
        assert_eq!(outcome.settle().await, &Persistence::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_food_404_gives_vision_guidance() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("plate.JPG");
        std::fs::write(&photo, [0xff, 0xd8, 0xff]).unwrap();

        let body = json!({ "error": { "code": 404, "message": "model not found" } });
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(404, body.to_string()))]);
        let orch = orchestrator(transport.clone(), "", Arc::new(SqliteHistory::in_memory().unwrap()));

        let result = orch.scan_food(&photo, Language::English).await.unwrap();
        assert!(!result.succeeded);
        assert!(result.html.contains(VISION_UNAVAILABLE));
        assert_eq!(transport.models(), vec!["vision-model"]);

        let inline = transport.requests()[0].inline_data().cloned().unwrap();
        assert_eq!(inline.mime_type, "image/jpeg");
        assert_eq!(inline.data, "/9j/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_food_rejects_unsupported_or_missing_file() {
        let transport = ScriptedTransport::new(vec![]);
        let orch = orchestrator(transport.clone(), "", Arc::new(SqliteHistory::in_memory().unwrap()));

        let failed = orch
            .scan_food(Path::new("notes.txt"), Language::English)
            .await
            .unwrap_err();
        assert_eq!(failed.stage, Stage::EncodingImage);

        let failed = orch
            .scan_food(Path::new("/no/such/plate.png"), Language::English)
            .await
            .unwrap_err();
        assert_eq!(failed.stage, Stage::EncodingImage);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_without_context() {
        let transport = ScriptedTransport::new(vec![ok_reply("<p>Yes, in moderation.</p>")]);
        let orch = orchestrator(transport.clone(), "", Arc::new(SqliteHistory::in_memory().unwrap()));

        let result = orch
            .chat(None, "Can I eat mangoes?", Language::English)
            .await
            .unwrap();
        assert!(result.succeeded);

        let prompt = transport.requests()[0].prompt_text().unwrap().to_string();
        assert!(!prompt.contains("Context:"));
        assert!(prompt.contains("Can I eat mangoes?"));
        assert_eq!(transport.models(), vec!["text-model"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_uses_given_context_and_rejects_blank() {
        let transport = ScriptedTransport::new(vec![ok_reply("<p>ok</p>")]);
        let orch = orchestrator(transport.clone(), "", Arc::new(SqliteHistory::in_memory().unwrap()));
        let context = ConversationContext::from_report_text("scan.jpg", "HbA1c 8.2%").unwrap();

        orch.chat(Some(&context), "Is this bad?", Language::Hindi).await.unwrap();
        let prompt = transport.requests()[0].prompt_text().unwrap().to_string();
        assert!(prompt.contains("HbA1c 8.2%"));
        assert!(prompt.contains("in Hindi"));

        let failed = orch.chat(Some(&context), "  ", Language::English).await.unwrap_err();
        assert_eq!(failed.stage, Stage::Requesting);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_transport_is_rendered_not_raised() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError("dns failure".to_string())),
            Err(TransportError("dns failure".to_string())),
            Err(TransportError("dns failure".to_string())),
        ]);
        let orch = orchestrator(transport.clone(), "", Arc::new(SqliteHistory::in_memory().unwrap()));

        let result = orch.chat(None, "hello", Language::English).await.unwrap();
        assert!(!result.succeeded);
        assert!(result.html.contains("dns failure"));
        assert_eq!(transport.call_count(), 3);
    }

    #[test]
    fn test_image_mime_types() {
        assert_eq!(image_mime_type(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(image_mime_type(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(image_mime_type(Path::new("a")), None);
        assert_eq!(image_mime_type(Path::new("a.pdf")), None);
    }
}
