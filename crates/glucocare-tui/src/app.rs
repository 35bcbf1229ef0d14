use std::path::PathBuf;
use std::sync::Arc;

use glucocare_core::{
    AiCallResult, AuthError, Config, Conversation, ConversationContext, Failed, Identity,
    Language, LocalIdentity, LocalObjectStorage, Orchestrator, Persistence, RateLimiter,
    ReportOutcome, ReportRecord, SqliteHistory, User,
};
use ratatui::widgets::ListState;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Login,
    Report,
    Food,
    Chat,
    History,
}

impl Tab {
    pub const ALL: [Tab; 5] = [Tab::Login, Tab::Report, Tab::Food, Tab::Chat, Tab::History];

    pub fn title(&self) -> &'static str {
        match self {
            Tab::Login => "Login",
            Tab::Report => "Report",
            Tab::Food => "Food",
            Tab::Chat => "Chat",
            Tab::History => "History",
        }
    }

    pub fn index(&self) -> usize {
        Tab::ALL.iter().position(|t| t == self).unwrap_or(0)
    }

    pub fn next(&self) -> Tab {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    pub fn prev(&self) -> Tab {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text field with a character cursor.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    value: String,
    cursor: usize,
}

impl TextInput {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.value.chars().count()
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.char_count() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.char_count();
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    /// Empty the field and return what it held.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value)
    }
}

/// Strip the quotes terminals add when a file is dropped onto them.
pub fn clean_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

type Task<T> = Option<JoinHandle<T>>;

/// Await a spawned task only once it has finished, leaving the slot empty.
async fn finished<T>(slot: &mut Task<T>) -> Option<Result<T, JoinError>> {
    if !slot.as_ref().is_some_and(|task| task.is_finished()) {
        return None;
    }
    let task = slot.take()?;
    Some(task.await)
}

pub struct App {
    pub should_quit: bool,
    pub tab: Tab,
    pub input_mode: InputMode,
    pub language: Language,
    pub status: Option<String>,

    // Services
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
    limiter: Arc<RateLimiter>,
    history_store: Arc<SqliteHistory>,
    storage: Arc<LocalObjectStorage>,
    pub identity: Arc<LocalIdentity>,
    session: watch::Receiver<Option<User>>,
    pub user: Option<User>,

    // Login
    pub email: TextInput,
    pub password: TextInput,
    pub login_field: LoginField,
    pub login_error: Option<String>,
    pub login_task: Task<Result<User, AuthError>>,
    pub signing_up: bool,
    pub confirm_delete: bool,
    pub account_task: Task<Result<(), AuthError>>,

    // Report
    pub report_path: TextInput,
    pub report_task: Task<Result<ReportOutcome, Failed>>,
    pub report_outcome: Option<ReportOutcome>,
    pub report_save: Task<Persistence>,
    pub report_error: Option<String>,
    pub report_scroll: u16,

    // Food
    pub food_path: TextInput,
    pub food_task: Task<Result<AiCallResult, Failed>>,
    pub food_result: Option<AiCallResult>,
    pub food_error: Option<String>,
    pub food_scroll: u16,

    // Chat
    pub chat_input: TextInput,
    pub conversation: Conversation,
    pub chat_task: Task<Result<AiCallResult, Failed>>,
    pub chat_scroll: u16,

    // History
    pub history: Vec<ReportRecord>,
    pub history_state: ListState,
    pub history_task: Task<glucocare_core::Result<Vec<ReportRecord>>>,
    pub history_error: Option<String>,
    pub history_stale: bool,
    pub history_scroll: u16,

    // API key popup
    pub show_api_key_input: bool,
    pub api_key_input: TextInput,

    pub animation_frame: u8,
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let data_dir = config.data_dir()?;
        let identity = Arc::new(LocalIdentity::open(&data_dir.join("accounts.sqlite"))?);
        let history_store = Arc::new(SqliteHistory::open(&data_dir.join("history.sqlite"))?);
        let storage = Arc::new(LocalObjectStorage::new(data_dir.join("uploads")));
        let limiter = Arc::new(RateLimiter::new(config.min_interval()));
        let orchestrator = build_orchestrator(&config, &limiter, &history_store, &storage);
        let session = identity.on_session_change();

        Ok(Self {
            should_quit: false,
            tab: Tab::Login,
            input_mode: InputMode::Normal,
            language: config.language(),
            status: None,

            orchestrator,
            limiter,
            history_store,
            storage,
            user: identity.current_user(),
            identity,
            session,
            config,

            email: TextInput::default(),
            password: TextInput::default(),
            login_field: LoginField::Email,
            login_error: None,
            login_task: None,
            signing_up: false,
            confirm_delete: false,
            account_task: None,

            report_path: TextInput::default(),
            report_task: None,
            report_outcome: None,
            report_save: None,
            report_error: None,
            report_scroll: 0,

            food_path: TextInput::default(),
            food_task: None,
            food_result: None,
            food_error: None,
            food_scroll: 0,

            chat_input: TextInput::default(),
            conversation: Conversation::new(),
            chat_task: None,
            chat_scroll: 0,

            history: Vec::new(),
            history_state: ListState::default(),
            history_task: None,
            history_error: None,
            history_stale: true,
            history_scroll: 0,

            show_api_key_input: false,
            api_key_input: TextInput::default(),

            animation_frame: 0,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.login_task.is_some()
            || self.account_task.is_some()
            || self.report_task.is_some()
            || self.food_task.is_some()
            || self.chat_task.is_some()
            || self.history_task.is_some()
    }

    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn dots(&self) -> String {
        ".".repeat(self.animation_frame as usize + 1)
    }

    pub fn switch_tab(&mut self, tab: Tab) {
        self.tab = tab;
        self.input_mode = InputMode::Normal;
        self.confirm_delete = false;
        if tab == Tab::History && self.history_stale {
            self.refresh_history();
        }
    }

    pub fn cycle_language(&mut self) {
        self.language = self.language.next();
        self.status = Some(format!("Language: {}", self.language.display_name()));
    }

    /// Swap in a new API key for subsequent calls. Calls already running keep
    /// the orchestrator they started with.
    pub fn apply_api_key(&mut self, key: String) {
        self.config.api_key = Some(key);
        self.orchestrator =
            build_orchestrator(&self.config, &self.limiter, &self.history_store, &self.storage);
        info!("API key updated");
    }

    pub fn selected_record(&self) -> Option<&ReportRecord> {
        self.history_state.selected().and_then(|i| self.history.get(i))
    }

    pub fn history_down(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let i = self
            .history_state
            .selected()
            .map_or(0, |i| (i + 1).min(self.history.len() - 1));
        self.history_state.select(Some(i));
        self.history_scroll = 0;
    }

    pub fn history_up(&mut self) {
        let i = self.history_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.history_state.select(Some(i));
        self.history_scroll = 0;
    }

    /// Use the selected saved report as the chat context.
    pub fn use_selected_record(&mut self) {
        let Some(record) = self.selected_record() else {
            return;
        };
        match ConversationContext::from_record(record) {
            Some(context) => {
                self.status = Some(format!("Chat context: {}", context.source()));
                self.conversation.set_context(Some(context));
            }
            None => {
                self.status = Some("That report has no text to use as context.".to_string());
            }
        }
    }

    pub fn refresh_history(&mut self) {
        let Some(user) = self.user.clone() else {
            self.history.clear();
            self.history_state.select(None);
            self.history_error = None;
            return;
        };
        if self.history_task.is_some() {
            return;
        }
        let orchestrator = self.orchestrator.clone();
        self.history_error = None;
        self.history_task = Some(tokio::spawn(async move { orchestrator.history(&user).await }));
    }

    /// Collect results of finished background work and session changes.
    pub async fn poll(&mut self) {
        self.poll_session();

        if let Some(joined) = finished(&mut self.login_task).await {
            match joined {
                Ok(Ok(user)) => {
                    info!(user = %user.id, "signed in");
                    self.password.clear();
                    self.login_error = None;
                }
                Ok(Err(err)) => self.login_error = Some(err.user_message()),
                Err(err) => self.login_error = Some(format!("Sign-in task failed: {}", err)),
            }
        }

        if let Some(joined) = finished(&mut self.account_task).await {
            match joined {
                Ok(Ok(())) => self.status = Some("Done.".to_string()),
                Ok(Err(err)) => self.login_error = Some(err.user_message()),
                Err(err) => self.login_error = Some(format!("Account task failed: {}", err)),
            }
        }

        if let Some(joined) = finished(&mut self.report_task).await {
            match joined {
                Ok(Ok(mut outcome)) => {
                    // A failed analysis carries no context and leaves the current one alone.
                    if let Some(context) = outcome.context.clone() {
                        self.conversation.set_context(Some(context));
                    }
                    self.report_save = outcome.save.take();
                    self.report_outcome = Some(outcome);
                }
                Ok(Err(failed)) => self.report_error = Some(failed.message),
                Err(err) => self.report_error = Some(format!("Analysis task failed: {}", err)),
            }
        }

        if let Some(joined) = finished(&mut self.report_save).await {
            let persistence = joined
                .unwrap_or_else(|e| Persistence::Failed(format!("save task failed: {}", e)));
            if persistence == Persistence::Saved {
                self.history_stale = true;
            }
            if let Some(outcome) = self.report_outcome.as_mut() {
                outcome.persistence = persistence;
            }
        }

        if let Some(joined) = finished(&mut self.food_task).await {
            match joined {
                Ok(Ok(result)) => self.food_result = Some(result),
                Ok(Err(failed)) => self.food_error = Some(failed.message),
                Err(err) => self.food_error = Some(format!("Food scan task failed: {}", err)),
            }
        }

        if let Some(joined) = finished(&mut self.chat_task).await {
            let reply = match joined {
                Ok(Ok(result)) => result.html,
                Ok(Err(failed)) => failed.message,
                Err(err) => format!("Chat task failed: {}", err),
            };
            self.conversation.push_assistant(reply);
        }

        if let Some(joined) = finished(&mut self.history_task).await {
            match joined {
                Ok(Ok(records)) => {
                    self.history_stale = false;
                    let selected = if records.is_empty() { None } else { Some(0) };
                    self.history = records;
                    self.history_state.select(selected);
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "could not load history");
                    self.history_error = Some(err.to_string());
                }
                Err(err) => self.history_error = Some(format!("History task failed: {}", err)),
            }
        }
    }

    fn poll_session(&mut self) {
        if !self.session.has_changed().unwrap_or(false) {
            return;
        }
        self.user = self.session.borrow_and_update().clone();
        self.history.clear();
        self.history_state.select(None);
        self.history_stale = true;
        self.confirm_delete = false;

        if self.user.is_some() {
            if self.tab == Tab::Login {
                self.switch_tab(Tab::Report);
            }
        } else {
            self.switch_tab(Tab::Login);
        }
    }
}

fn build_orchestrator(
    config: &Config,
    limiter: &Arc<RateLimiter>,
    history: &Arc<SqliteHistory>,
    storage: &Arc<LocalObjectStorage>,
) -> Arc<Orchestrator> {
    Arc::new(
        Orchestrator::from_config(config, limiter.clone(), history.clone())
            .with_storage(storage.clone()),
    )
}
