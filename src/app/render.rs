//! TUI描画関連の関数。

use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
};

use crate::{
    events::Screen,
    input,
    items::{ItemKind, Status},
    layout,
    shortcuts::{Shortcuts, format_keys},
    view::Summary,
};

use super::App;

/// INFOパネルに出すログ行数。
const LOG_TAIL: usize = 8;

/// 画面全体を描画する。
pub fn draw(f: &mut Frame, app: &App) {
    let main = layout::create_main_layout(f.area());
    let summary = app.session.summary();

    f.render_widget(summary_bar(&summary), main.summary_bar);

    if app.ui.screen == Screen::Preview {
        draw_preview(f, app, main.body);
    } else {
        let body = layout::create_body_layout(main.body);
        draw_items(f, app, body.items_table);
        let info = if app.ui.screen == Screen::Settings {
            settings_info_text(app)
        } else {
            main_info_text(app, &summary)
        };
        f.render_widget(
            Paragraph::new(info)
                .block(Block::default().borders(Borders::ALL).title("INFO"))
                .wrap(Wrap { trim: false }),
            body.info_panel,
        );
    }

    f.render_widget(
        Paragraph::new(help_text(app.ui.screen, &app.shortcuts))
            .block(Block::default().borders(Borders::ALL).title("HELP"))
            .wrap(Wrap { trim: true }),
        main.help_bar,
    );
    f.render_widget(status_bar(app), main.status_bar);

    // 入力ボックスは最前面に重ねる。
    if let Some(state) = &app.input_box {
        input::render_input_box(f, state);
    }
}

/// 件数の集計バー。
fn summary_bar(s: &Summary) -> Paragraph<'static> {
    let all = if s.is_all_selected { " (all)" } else { "" };
    let line = Line::from(vec![
        Span::raw(format!("Total {} | ", s.total)),
        Span::styled(format!("Loading {}", s.loading), Style::default().fg(Color::Yellow)),
        Span::raw(format!(" | Waiting {} | ", s.waiting)),
        Span::styled(format!("Failed {}", s.fail), Style::default().fg(Color::Red)),
        Span::raw(" | "),
        Span::styled(format!("Success {}", s.success), Style::default().fg(Color::Green)),
        Span::raw(format!(" | Selected {}{all}", s.selected)),
    ]);
    Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("SUMMARY"))
}

fn draw_items(f: &mut Frame, app: &App, area: Rect) {
    let store = app.session.store();
    let visible = app.visible_items();

    let rows = visible.iter().map(|item| {
        let mark = if store.is_selected(&item.key) { "[x]" } else { "[ ]" };
        let title = match item.kind {
            ItemKind::Folder => {
                let arrow = if item.expanded { "▾" } else { "▸" };
                format!("{arrow} {}", item.title)
            }
            _ if item.group_key.is_some() => format!("  {}", item.title),
            _ => item.title.clone(),
        };
        let progress = match (item.status, item.progress) {
            (Status::Uploading, Some(p)) => format!("{p:>3}%"),
            _ => String::new(),
        };
        Row::new(vec![
            Cell::from(mark),
            Cell::from(title),
            Cell::from(kind_label(item.kind)),
            Cell::from(item.status.as_str()).style(status_style(item.status)),
            Cell::from(progress),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(6),
            Constraint::Length(12),
            Constraint::Length(5),
        ],
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("ITEMS [{}]", app.session.source())),
    )
    .header(Row::new(vec!["", "title", "kind", "status", "prog"]).bold())
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(255, 140, 0))
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    );

    let mut state = TableState::default();
    if !visible.is_empty() {
        state.select(Some(app.ui.cursor));
    }
    f.render_stateful_widget(table, area, &mut state);
}

/// 一覧画面の右パネル：カーソル行、キュー、一括操作の対象数、ログ。
fn main_info_text(app: &App, s: &Summary) -> String {
    let mut lines = Vec::new();

    let queue = app.session.queue();
    match app.current_item() {
        Some(item) => {
            let slot = if queue.is_running(&item.key) {
                "running"
            } else if queue.is_waiting(&item.key) {
                "queued"
            } else {
                "idle"
            };
            lines.push(format!("Title:  {}", item.title));
            lines.push(format!("Key:    {}", item.key));
            lines.push(format!("Id:     {}", or_dash(&item.id)));
            lines.push(format!("Status: {} ({slot})", item.status));
        }
        None if app.session.store().is_empty() => lines.push("No items (press a to add)".into()),
        None => lines.push("No row selected".into()),
    }
    lines.push(String::new());
    lines.push(format!(
        "Source: {}  KB: {}",
        app.session.source(),
        or_dash(&app.cfg.server.kb_id)
    ));
    lines.push(format!("Orchestration: {}", or_dash(app.session.orchestration_id())));
    lines.push(format!(
        "Queue: {} running / {} max, {} waiting",
        queue.running_count(),
        queue.max_concurrent(),
        queue.waiting_count()
    ));

    let breakdown: Vec<String> = Status::ALL
        .iter()
        .filter(|st| s.count(**st) > 0)
        .map(|st| format!("{st} {}", s.count(*st)))
        .collect();
    if !breakdown.is_empty() {
        lines.push(breakdown.join(", "));
    }

    let a = &s.actions;
    lines.push(String::new());
    lines.push(format!(
        "Selected {}: upload {} | pull {} | create {}",
        s.selected,
        a.uploadable.len(),
        a.pullable.len(),
        a.creatable.len()
    ));
    lines.push(format!(
        "retry {} | abort {} | delete {}",
        a.retryable.len(),
        a.abortable.len(),
        if a.can_delete() { a.deletable.len().to_string() } else { "-".into() }
    ));

    lines.push(String::new());
    lines.push("Log:".into());
    lines.extend(app.ui.log_tail(LOG_TAIL).iter().cloned());
    lines.join("\n")
}

/// 設定画面の右パネル：編集中の値（秘密は伏せ字）。
fn settings_info_text(app: &App) -> String {
    let d = &app.draft;
    [
        format!("Base URL:       {}", d.server.base_url),
        format!("KB id:          {}", or_dash(&d.server.kb_id)),
        format!("Parent id:      {}", or_dash(&d.server.parent_id)),
        format!("Source:         {}", d.import.source),
        format!("Max concurrent: {}", d.import.max_concurrent),
        format!("Poll interval:  {} ms", d.import.poll_interval_ms),
        String::new(),
        format!("Notion token:   {}", masked(&d.notion.integration_token)),
        format!("Feishu app id:  {}", or_dash(&d.feishu.app_id)),
        format!("Feishu secret:  {}", masked(&d.feishu.app_secret)),
        format!("Feishu token:   {}", masked(&d.feishu.user_access_token)),
        String::new(),
        "Saving restarts the session and drops current items.".into(),
    ]
    .join("\n")
}

fn draw_preview(f: &mut Frame, app: &App, area: Rect) {
    let (title, body) = match app.current_item() {
        Some(item) if !item.content.is_empty() => (item.title.clone(), item.content.clone()),
        Some(item) => (item.title.clone(), "(content not pulled yet)".into()),
        None => ("-".into(), String::new()),
    };
    f.render_widget(
        Paragraph::new(body)
            .block(Block::default().borders(Borders::ALL).title(format!("PREVIEW: {title}")))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn status_bar(app: &App) -> Paragraph<'static> {
    let screen = match app.ui.screen {
        Screen::Main => "Main",
        Screen::Settings => "Settings",
        Screen::Preview => "Preview",
    };
    let (text, style) = match &app.ui.error {
        Some(err) => (format!("[{screen}] ERROR: {err}"), Style::default().fg(Color::Red)),
        None => (format!("[{screen}] {}", app.ui.status), Style::default()),
    };
    Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true })
}

/// 画面ごとのショートカット一覧。
fn help_text(screen: Screen, sc: &Shortcuts) -> String {
    let entries: Vec<(&Vec<String>, &str)> = match screen {
        Screen::Main => {
            let m = &sc.main;
            vec![
                (&m.add, "add"),
                (&m.select, "select"),
                (&m.select_all, "all"),
                (&m.clear_selection, "unselect"),
                (&m.upload, "upload"),
                (&m.pull, "pull"),
                (&m.create, "create"),
                (&m.retry, "retry"),
                (&m.abort, "abort"),
                (&m.delete, "delete"),
                (&m.enter, "open"),
                (&m.reset, "reset"),
                (&m.settings, "settings"),
                (&m.quit, "quit"),
            ]
        }
        Screen::Settings => {
            let s = &sc.settings;
            vec![
                (&s.base_url, "url"),
                (&s.kb_id, "kb"),
                (&s.parent_id, "parent"),
                (&s.source, "source"),
                (&s.max_concurrent, "concurrency"),
                (&s.poll_interval, "poll"),
                (&s.notion_token, "notion"),
                (&s.feishu_app_id, "feishu id"),
                (&s.feishu_app_secret, "feishu secret"),
                (&s.feishu_user_token, "feishu token"),
                (&s.save, "save"),
                (&s.cancel, "cancel"),
            ]
        }
        Screen::Preview => vec![(&sc.preview.close, "back")],
    };
    entries
        .iter()
        .map(|(keys, label)| format!("{}: {label}", format_keys(keys)))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn kind_label(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::File => "file",
        ItemKind::Other => "doc",
        ItemKind::Folder => "folder",
    }
}

fn status_style(status: Status) -> Style {
    if status == Status::Success {
        Style::default().fg(Color::Green)
    } else if status.is_failure() {
        Style::default().fg(Color::Red)
    } else if status.is_in_flight() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

fn masked(s: &str) -> String {
    if s.is_empty() {
        "(unset)".into()
    } else {
        "*".repeat(s.chars().count().min(8))
    }
}
