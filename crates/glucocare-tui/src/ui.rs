use glucocare_core::orchestrator::Persistence;
use glucocare_core::{food_verdict, ChatRole, FoodVerdict};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
    Frame,
};

use crate::app::{App, InputMode, LoginField, Tab, TextInput};
use crate::html;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, tabs_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_tabs(app, frame, tabs_area);

    match app.tab {
        Tab::Login => render_login(app, frame, body_area),
        Tab::Report => render_report(app, frame, body_area),
        Tab::Food => render_food(app, frame, body_area),
        Tab::Chat => render_chat(app, frame, body_area),
        Tab::History => render_history(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let who = match &app.user {
        Some(user) => format!(" {} ", user.email),
        None => " not signed in ".to_string(),
    };
    let key_hint = if app.config.has_api_key() { "" } else { " [no API key: press K] " };

    let title = Line::from(vec![
        Span::styled(" GlucoCare AI ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(who, Style::default().fg(Color::White)),
        Span::styled(
            format!(" {} ", app.language.display_name()),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(key_hint, Style::default().fg(Color::Red)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_tabs(app: &App, frame: &mut Frame, area: Rect) {
    let titles: Vec<String> = Tab::ALL
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{} {}", i + 1, t.title()))
        .collect();
    let tabs = Tabs::new(titles)
        .select(app.tab.index())
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " EDIT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let mut hints: Vec<Span> = Vec::new();
    match (app.tab, app.input_mode) {
        (Tab::Login, InputMode::Editing) => {
            hints.extend(hint("Tab", "field"));
            hints.extend(hint("Enter", "log in"));
            hints.extend(hint("Ctrl-N", "sign up"));
            hints.extend(hint("Esc", "done"));
        }
        (Tab::Login, InputMode::Normal) if app.user.is_some() => {
            hints.extend(hint("o", "sign out"));
            hints.extend(hint("D", "delete account"));
        }
        (Tab::Login, InputMode::Normal) => {
            hints.extend(hint("i", "edit"));
            hints.extend(hint("g", "Google"));
        }
        (Tab::Report | Tab::Food, InputMode::Normal) => {
            hints.extend(hint("i", "path"));
            hints.extend(hint("Enter", "analyze"));
            hints.extend(hint("j/k", "scroll"));
        }
        (Tab::Chat, InputMode::Normal) => {
            hints.extend(hint("i", "type"));
            hints.extend(hint("j/k", "scroll"));
            hints.extend(hint("x", "clear context"));
        }
        (Tab::History, InputMode::Normal) => {
            hints.extend(hint("j/k", "select"));
            hints.extend(hint("Enter", "use snippet as chat context"));
            hints.extend(hint("r", "refresh"));
        }
        (_, InputMode::Editing) => {
            hints.extend(hint("Enter", "send"));
            hints.extend(hint("Esc", "stop typing"));
        }
    }
    if app.input_mode == InputMode::Normal {
        hints.extend(hint("Tab", "next"));
        hints.extend(hint("L", "language"));
        hints.extend(hint("K", "API key"));
        hints.extend(hint("q", "quit"));
    }

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];
    if let Some(status) = &app.status {
        spans.push(Span::styled(format!("{} ", status), Style::default().fg(Color::Yellow)));
    }
    spans.extend(hints);

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// One bordered input line, horizontally scrolled to keep the cursor visible.
fn render_input(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    input: &TextInput,
    masked: bool,
    active: bool,
) {
    let border = if active { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(format!(" {} ", title));

    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = input.cursor();
    let scroll_offset = if inner_width == 0 || cursor_pos < inner_width {
        0
    } else {
        cursor_pos - inner_width + 1
    };

    let visible: String = if masked {
        "•".repeat(input.char_count().saturating_sub(scroll_offset).min(inner_width))
    } else {
        input.value().chars().skip(scroll_offset).take(inner_width).collect()
    };

    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan)).block(block),
        area,
    );

    if active {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

/// Rows `lines` occupy once wrapped to `width`.
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    lines
        .iter()
        .map(|l| l.width().max(1).div_ceil(width))
        .sum::<usize>()
        .min(u16::MAX as usize) as u16
}

fn clamp_scroll(scroll: &mut u16, lines: &[Line], area: Rect) {
    let inner = Rect::new(0, 0, area.width.saturating_sub(2), area.height.saturating_sub(2));
    let max = wrapped_height(lines, inner.width).saturating_sub(inner.height);
    *scroll = (*scroll).min(max);
}

fn loading_line(app: &App, label: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("{}{}", label, app.dots()),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    ))
}

fn error_line(message: &str) -> Line<'static> {
    Line::from(Span::styled(message.to_string(), Style::default().fg(Color::Red)))
}

fn dim_line(message: String) -> Line<'static> {
    Line::from(Span::styled(message, Style::default().fg(Color::DarkGray)))
}

fn render_login(app: &mut App, frame: &mut Frame, area: Rect) {
    if let Some(user) = &app.user {
        let lines = vec![
            Line::from(Span::styled("Signed in", Style::default().fg(Color::Green).bold())),
            Line::from(user.email.clone()),
            Line::default(),
            dim_line("Your analyzed reports are saved to History.".to_string()),
        ];
        let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Account "));
        frame.render_widget(panel, area);
        return;
    }

    let [email_area, password_area, message_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(area);

    let editing = app.input_mode == InputMode::Editing;
    render_input(
        frame,
        email_area,
        "Email",
        &app.email,
        false,
        editing && app.login_field == LoginField::Email,
    );
    render_input(
        frame,
        password_area,
        "Password",
        &app.password,
        true,
        editing && app.login_field == LoginField::Password,
    );

    let mut lines = Vec::new();
    if app.login_task.is_some() {
        let label = if app.signing_up { "Creating account" } else { "Signing in" };
        lines.push(loading_line(app, label));
    } else if let Some(error) = &app.login_error {
        lines.push(error_line(error));
    }
    lines.push(Line::default());
    lines.push(dim_line(
        "Log in to keep a history of your reports. New here? Fill in both fields and press Ctrl-N.".to_string(),
    ));
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), message_area);
}

fn render_report(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, result_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

    render_input(
        frame,
        input_area,
        "Blood report image",
        &app.report_path,
        false,
        app.input_mode == InputMode::Editing,
    );

    let mut lines: Vec<Line> = Vec::new();
    let mut title = " Analysis ".to_string();
    if app.report_task.is_some() {
        lines.push(loading_line(app, "Reading and analyzing report"));
    } else if let Some(error) = &app.report_error {
        lines.push(error_line(error));
    } else if let Some(outcome) = &app.report_outcome {
        title = format!(" Analysis: {} ", outcome.file_name);
        lines.extend(html::to_lines(&outcome.result.html));
        lines.push(Line::default());
        match &outcome.persistence {
            Persistence::Pending => lines.push(dim_line("Saving to history...".to_string())),
            Persistence::Saved => lines.push(Line::from(Span::styled(
                "Saved to history.",
                Style::default().fg(Color::Green).add_modifier(Modifier::DIM),
            ))),
            Persistence::Failed(reason) => {
                lines.push(dim_line(format!("Not saved to history: {}", reason)))
            }
            Persistence::Skipped if app.user.is_none() && outcome.result.succeeded => {
                lines.push(dim_line("Log in to save this report to your history.".to_string()))
            }
            Persistence::Skipped => {}
        }
        if outcome.context.is_some() && outcome.result.succeeded {
            lines.push(dim_line("Ask follow-up questions in the Chat tab.".to_string()));
        }
    } else {
        lines.push(dim_line(format!(
            "Type the path of a blood test photo and press Enter. Answers are in {}.",
            app.language.display_name()
        )));
    }

    clamp_scroll(&mut app.report_scroll, &lines, result_area);
    let panel = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((app.report_scroll, 0));
    frame.render_widget(panel, result_area);
}

fn verdict_style(verdict: FoodVerdict) -> Style {
    let color = match verdict {
        FoodVerdict::Safe => Color::Green,
        FoodVerdict::Moderate => Color::Yellow,
        FoodVerdict::Avoid => Color::Red,
    };
    Style::default().bg(color).fg(Color::Black).add_modifier(Modifier::BOLD)
}

fn render_food(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, result_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

    render_input(
        frame,
        input_area,
        "Food photo",
        &app.food_path,
        false,
        app.input_mode == InputMode::Editing,
    );

    let mut lines: Vec<Line> = Vec::new();
    let mut title = Line::from(" Food check ");
    if app.food_task.is_some() {
        lines.push(loading_line(app, "Looking at your plate"));
    } else if let Some(error) = &app.food_error {
        lines.push(error_line(error));
    } else if let Some(result) = &app.food_result {
        if let Some(verdict) = result.succeeded.then(|| food_verdict(&result.html)).flatten() {
            title = Line::from(vec![
                Span::raw(" Food check "),
                Span::styled(format!(" {} ", verdict.as_str()), verdict_style(verdict)),
                Span::raw(" "),
            ]);
        }
        lines.extend(html::to_lines(&result.html));
    } else {
        lines.push(dim_line(
            "Type the path of a meal photo and press Enter to check whether it suits a diabetic diet.".to_string(),
        ));
    }

    clamp_scroll(&mut app.food_scroll, &lines, result_area);
    let panel = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((app.food_scroll, 0));
    frame.render_widget(panel, result_area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

    let title = match app.conversation.context() {
        Some(ctx) => format!(" Chat (context: {}) ", ctx.source()),
        None => " Chat (no report context) ".to_string(),
    };

    let mut lines: Vec<Line> = Vec::new();
    if app.conversation.turns().is_empty() && app.chat_task.is_none() {
        lines.push(dim_line(
            "Ask about your results, food or exercise. Analyze a report first for personalised answers.".to_string(),
        ));
    }
    for turn in app.conversation.turns() {
        match turn.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(turn.text.clone()));
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                lines.extend(html::to_lines(&turn.text));
            }
        }
        lines.push(Line::default());
    }
    if app.chat_task.is_some() {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        lines.push(loading_line(app, "Thinking"));
    }

    clamp_scroll(&mut app.chat_scroll, &lines, chat_area);
    let chat = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_input(
        frame,
        input_area,
        "Ask",
        &app.chat_input,
        false,
        app.input_mode == InputMode::Editing,
    );
}

fn render_history(app: &mut App, frame: &mut Frame, area: Rect) {
    if app.user.is_none() {
        let panel = Paragraph::new(dim_line("Log in to see your saved reports.".to_string()))
            .block(Block::default().borders(Borders::ALL).title(" History "));
        frame.render_widget(panel, area);
        return;
    }

    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(35), Constraint::Percentage(65)]).areas(area);

    let items: Vec<ListItem> = app
        .history
        .iter()
        .map(|record| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    record.created_at.format("%Y-%m-%d %H:%M ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(record.file_name.clone()),
            ]))
        })
        .collect();

    let list_title = if app.history_task.is_some() {
        format!(" Reports (loading{}) ", app.dots())
    } else {
        format!(" Reports ({}) ", app.history.len())
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(list_title))
        .highlight_style(Style::default().bg(Color::Cyan).fg(Color::Black))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut app.history_state);

    let mut lines: Vec<Line> = Vec::new();
    if let Some(error) = &app.history_error {
        lines.push(error_line(error));
    } else if let Some(record) = app.selected_record() {
        lines.push(dim_line(format!("Language: {}", record.language)));
        if let Some(url) = &record.image_url {
            lines.push(dim_line(format!("Image: {}", url)));
        }
        lines.push(Line::default());
        lines.extend(html::to_lines(&record.analysis_html));
    } else if app.history_task.is_none() {
        lines.push(dim_line("No saved reports yet.".to_string()));
    }

    clamp_scroll(&mut app.history_scroll, &lines, detail_area);
    let detail = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(" Report "))
        .wrap(Wrap { trim: false })
        .scroll((app.history_scroll, 0));
    frame.render_widget(detail, detail_area);
}

/// Popup rectangle and the row the key is typed on, both kept inside `area`.
fn api_key_popup_layout(area: Rect) -> (Rect, Rect) {
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7.min(area.height.saturating_sub(4));
    let popup_area = Rect::new(
        area.x + area.width.saturating_sub(popup_width) / 2,
        area.y + area.height.saturating_sub(popup_height) / 2,
        popup_width,
        popup_height,
    );

    let inner_height = popup_height.saturating_sub(2);
    if inner_height == 0 {
        return (popup_area, Rect::new(popup_area.x, popup_area.y, 0, 0));
    }
    let inner_y = popup_area.y + 1;
    let input_y = (inner_y + 3).min(inner_y + inner_height - 1);
    let input_area = Rect::new(popup_area.x + 1, input_y, popup_width.saturating_sub(2), 1);
    (popup_area, input_area)
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let (popup_area, input_area) = api_key_popup_layout(area);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Gemini API key ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);
    if input_area.height == 0 {
        return;
    }

    let instructions = Paragraph::new("Paste your key. Enter saves it to the config file, Esc cancels.")
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true });
    let instructions_height = input_area.y.saturating_sub(inner.y).min(2);
    frame.render_widget(
        instructions,
        Rect::new(inner.x, inner.y, inner.width, instructions_height),
    );

    let key = app.api_key_input.value();
    let count = app.api_key_input.char_count();
    let display_text = if count <= 4 {
        "*".repeat(count)
    } else {
        let last_four: String = key.chars().skip(count - 4).collect();
        format!("{}...{}", "*".repeat((count - 4).min(20)), last_four)
    };
    frame.render_widget(
        Paragraph::new(display_text).style(Style::default().fg(Color::Cyan)),
        input_area,
    );
    let cursor_x = app.api_key_input.cursor().min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_height_counts_wrapped_rows() {
        let lines = vec![Line::from("a".repeat(25)), Line::default(), Line::from("short")];
        assert_eq!(wrapped_height(&lines, 10), 3 + 1 + 1);
    }

    #[test]
    fn test_scroll_is_clamped_to_content() {
        let lines: Vec<Line> = (0..10).map(|i| Line::from(format!("line {i}"))).collect();
        let mut scroll = u16::MAX;
        clamp_scroll(&mut scroll, &lines, Rect::new(0, 0, 40, 6));
        assert_eq!(scroll, 6);
    }

    #[test]
    fn test_api_key_popup_fits_small_terminals() {
        let (popup, input) = api_key_popup_layout(Rect::new(0, 0, 80, 24));
        assert_eq!(popup.height, 7);
        assert_eq!(input.y, popup.y + 4);
        assert_eq!(input.height, 1);

        for height in 0..12 {
            let area = Rect::new(0, 0, 80, height);
            let (popup, input) = api_key_popup_layout(area);
            assert!(popup.bottom() <= area.bottom());
            assert!(input.bottom() <= popup.bottom());
            if input.height > 0 {
                assert!(input.y > popup.y && input.y < popup.bottom() - 1);
            }
        }
    }
}
