use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use glucocare_core::auth::validate_credentials;
use glucocare_core::{Config, Identity};
use tracing::warn;

use crate::app::{clean_path, App, InputMode, LoginField, Tab, TextInput};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
    app.poll().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_api_key_input {
        handle_api_key_input(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    app.status = None;

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Tab => app.switch_tab(app.tab.next()),
        KeyCode::BackTab => app.switch_tab(app.tab.prev()),
        KeyCode::Char(c @ '1'..='5') => {
            let idx = c as usize - '1' as usize;
            app.switch_tab(Tab::ALL[idx]);
        }
        KeyCode::Char('L') => app.cycle_language(),
        KeyCode::Char('K') => {
            app.api_key_input.clear();
            app.show_api_key_input = true;
        }
        _ => match app.tab {
            Tab::Login => handle_login_normal(app, key),
            Tab::Report => handle_result_normal(app, key, Tab::Report),
            Tab::Food => handle_result_normal(app, key, Tab::Food),
            Tab::Chat => handle_chat_normal(app, key),
            Tab::History => handle_history_normal(app, key),
        },
    }
}

fn handle_login_normal(app: &mut App, key: KeyEvent) {
    if app.user.is_some() {
        match key.code {
            KeyCode::Char('o') => sign_out(app),
            KeyCode::Char('D') => delete_account(app),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,
        KeyCode::Char('g') => federated_sign_in(app),
        _ => {}
    }
}

fn handle_result_normal(app: &mut App, key: KeyEvent, tab: Tab) {
    let scroll = match tab {
        Tab::Report => &mut app.report_scroll,
        _ => &mut app.food_scroll,
    };
    match key.code {
        KeyCode::Char('i') | KeyCode::Char('e') => app.input_mode = InputMode::Editing,
        KeyCode::Char('j') | KeyCode::Down => *scroll = scroll.saturating_add(1),
        KeyCode::Char('k') | KeyCode::Up => *scroll = scroll.saturating_sub(1),
        KeyCode::Char('g') => *scroll = 0,
        KeyCode::Enter => match tab {
            Tab::Report => start_report(app),
            _ => start_food_scan(app),
        },
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('i') | KeyCode::Char('e') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing
        }
        KeyCode::Char('j') | KeyCode::Down => app.chat_scroll = app.chat_scroll.saturating_add(1),
        KeyCode::Char('k') | KeyCode::Up => app.chat_scroll = app.chat_scroll.saturating_sub(1),
        KeyCode::Char('x') => {
            app.conversation.clear_context();
            app.status = Some("Chat context cleared.".to_string());
        }
        _ => {}
    }
}

fn handle_history_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.history_down(),
        KeyCode::Char('k') | KeyCode::Up => app.history_up(),
        KeyCode::PageDown => app.history_scroll = app.history_scroll.saturating_add(5),
        KeyCode::PageUp => app.history_scroll = app.history_scroll.saturating_sub(5),
        KeyCode::Char('r') => app.refresh_history(),
        KeyCode::Enter => app.use_selected_record(),
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.input_mode = InputMode::Normal;
        return;
    }

    match app.tab {
        Tab::Login => handle_login_editing(app, key),
        Tab::Report => {
            if key.code == KeyCode::Enter {
                app.input_mode = InputMode::Normal;
                start_report(app);
            } else {
                edit_text(&mut app.report_path, key);
            }
        }
        Tab::Food => {
            if key.code == KeyCode::Enter {
                app.input_mode = InputMode::Normal;
                start_food_scan(app);
            } else {
                edit_text(&mut app.food_path, key);
            }
        }
        Tab::Chat => {
            if key.code == KeyCode::Enter {
                send_chat(app);
            } else {
                edit_text(&mut app.chat_input, key);
            }
        }
        Tab::History => app.input_mode = InputMode::Normal,
    }
}

fn handle_login_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            app.login_field = match app.login_field {
                LoginField::Email => LoginField::Password,
                LoginField::Password => LoginField::Email,
            };
        }
        KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            password_auth(app, true)
        }
        KeyCode::Enter => password_auth(app, false),
        _ => match app.login_field {
            LoginField::Email => edit_text(&mut app.email, key),
            LoginField::Password => edit_text(&mut app.password, key),
        },
    }
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_api_key_input = false;
            app.api_key_input.clear();
        }
        KeyCode::Enter => {
            let key = app.api_key_input.take().trim().to_string();
            app.show_api_key_input = false;
            if key.is_empty() {
                return;
            }
            match Config::save_api_key(&key) {
                Ok(()) => app.status = Some("API key saved.".to_string()),
                Err(err) => {
                    warn!(error = %err, "could not save API key");
                    app.status = Some(format!("API key set for this session only: {}", err));
                }
            }
            app.apply_api_key(key);
        }
        _ => edit_text(&mut app.api_key_input, key),
    }
}

fn edit_text(input: &mut TextInput, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        _ => {}
    }
}

fn password_auth(app: &mut App, signing_up: bool) {
    if app.login_task.is_some() {
        return;
    }
    let email = app.email.value().trim().to_string();
    let password = app.password.value().to_string();
    if let Err(err) = validate_credentials(&email, &password, signing_up) {
        app.login_error = Some(err.to_string());
        return;
    }

    app.login_error = None;
    app.signing_up = signing_up;
    app.input_mode = InputMode::Normal;
    let identity = app.identity.clone();
    app.login_task = Some(tokio::spawn(async move {
        if signing_up {
            identity.sign_up_with_password(&email, &password).await
        } else {
            identity.sign_in_with_password(&email, &password).await
        }
    }));
}

fn federated_sign_in(app: &mut App) {
    if app.login_task.is_some() {
        return;
    }
    let identity = app.identity.clone();
    app.login_error = None;
    app.login_task = Some(tokio::spawn(async move {
        identity
            .sign_in_federated()
            .await
            .map_err(|err| glucocare_core::AuthError::Provider {
                code: err.code().to_string(),
                message: err.federated_message(),
            })
    }));
}

fn sign_out(app: &mut App) {
    if app.account_task.is_some() {
        return;
    }
    let identity = app.identity.clone();
    app.account_task = Some(tokio::spawn(async move { identity.sign_out().await }));
}

/// First press asks for confirmation, the second deletes.
fn delete_account(app: &mut App) {
    if app.account_task.is_some() {
        return;
    }
    if !app.confirm_delete {
        app.confirm_delete = true;
        app.status = Some("Press D again to permanently delete your account.".to_string());
        return;
    }
    app.confirm_delete = false;
    let identity = app.identity.clone();
    app.account_task = Some(tokio::spawn(async move { identity.delete_account().await }));
}

fn start_report(app: &mut App) {
    if app.report_task.is_some() {
        return;
    }
    let Some(path) = clean_path(app.report_path.value()) else {
        app.report_error = Some("Please choose a report image first.".to_string());
        return;
    };

    app.report_error = None;
    app.report_outcome = None;
    app.report_scroll = 0;
    let orchestrator = app.orchestrator.clone();
    let user = app.user.clone();
    let language = app.language;
    app.report_task = Some(tokio::spawn(async move {
        orchestrator.analyze_report(user.as_ref(), &path, language).await
    }));
}

fn start_food_scan(app: &mut App) {
    if app.food_task.is_some() {
        return;
    }
    let Some(path) = clean_path(app.food_path.value()) else {
        app.food_error = Some("Please choose a food photo first.".to_string());
        return;
    };

    app.food_error = None;
    app.food_result = None;
    app.food_scroll = 0;
    let orchestrator = app.orchestrator.clone();
    let language = app.language;
    app.food_task = Some(tokio::spawn(async move {
        orchestrator.scan_food(&path, language).await
    }));
}

fn send_chat(app: &mut App) {
    if app.chat_task.is_some() || app.chat_input.value().trim().is_empty() {
        return;
    }
    let message = app.chat_input.take();
    app.conversation.push_user(message.clone());
    app.chat_scroll = u16::MAX;

    let orchestrator = app.orchestrator.clone();
    let context = app.conversation.context().cloned();
    let language = app.language;
    app.chat_task = Some(tokio::spawn(async move {
        orchestrator.chat(context.as_ref(), &message, language).await
    }));
}
