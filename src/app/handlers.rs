//! キー入力ハンドラー関数。

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;

use crate::{
    error::ImportError,
    events::Screen,
    input::{InputBoxState, InputCallbackId},
    items::ItemKind,
    shortcuts::matches_shortcut,
    source::InputMode,
};

use super::App;

/// キー入力を1件処理し、終了すべきならtrueを返す。
pub fn handle_key(app: &mut App, k: KeyEvent) -> bool {
    // 入力ボックスが開いていれば最優先。
    if app.input_box.is_some() {
        handle_input_box_key(app, k);
        return false;
    }

    match app.ui.screen {
        Screen::Main => return handle_main_key(app, k),
        Screen::Settings => handle_settings_key(app, k),
        Screen::Preview => {
            if matches_shortcut(&k, &app.shortcuts.preview.close) {
                app.ui.screen = Screen::Main;
            }
        }
    }
    false
}

pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

/// セッション操作の結果をステータスバーへ反映する。
fn report<T>(
    app: &mut App,
    what: &str,
    result: Result<T, ImportError>,
    ok: impl FnOnce(T) -> String,
) {
    match result {
        Ok(v) => {
            app.ui.error = None;
            app.ui.status = ok(v);
        }
        Err(e) => {
            tracing::warn!("{what} rejected: {e}");
            app.ui.error = Some(format!("{what}: {e}"));
        }
    }
}

/// 一覧画面のキー処理。
fn handle_main_key(app: &mut App, k: KeyEvent) -> bool {
    let sc = &app.shortcuts.main;
    let hit = |keys: &[String]| matches_shortcut(&k, keys);

    if hit(&sc.quit) {
        return true;
    } else if hit(&sc.settings) {
        app.draft = app.cfg.clone();
        app.ui.screen = Screen::Settings;
        app.ui.status = "Settings".into();
    } else if hit(&sc.add) {
        open_add(app);
    } else if hit(&sc.select) {
        if let Some(key) = app.current_key() {
            app.session.store_mut().toggle_selection(&key);
        }
    } else if hit(&sc.select_all) {
        app.session.store_mut().toggle_all();
    } else if hit(&sc.clear_selection) {
        app.session.store_mut().clear_selection();
    } else if hit(&sc.upload) {
        let r = app.session.upload_selected();
        report(app, "upload", r, |n| format!("upload: {n} items submitted"));
    } else if hit(&sc.pull) {
        let r = app.session.pull_selected();
        report(app, "pull", r, |n| format!("pull: {n} items submitted"));
    } else if hit(&sc.create) {
        let r = app.session.create_selected();
        report(app, "create", r, |n| format!("create: {n} items submitted"));
    } else if hit(&sc.retry) {
        let r = app.session.retry_selected();
        report(app, "retry", r, |n| format!("retry: {n} items resubmitted"));
    } else if hit(&sc.abort) {
        let n = app.session.abort_selected();
        app.ui.status = format!("abort requested for {n} items");
    } else if hit(&sc.delete) {
        let r = app.session.delete_selected();
        report(app, "delete", r, |n| format!("deleted {n} items"));
    } else if hit(&sc.reset) {
        app.session.reset();
        app.ui.cursor = 0;
        app.ui.status = "Cleared".into();
        app.ui.push_log("session reset");
    } else if hit(&sc.enter) {
        open_current(app);
    } else if hit(&sc.down) {
        if app.ui.cursor + 1 < app.visible_items().len() {
            app.ui.cursor += 1;
        }
    } else if hit(&sc.up) {
        app.ui.cursor = app.ui.cursor.saturating_sub(1);
    }

    false
}

/// ソース種別に応じてアイテム投入を始める。
fn open_add(app: &mut App) {
    let (prompt, id) = match app.session.source().input_mode() {
        InputMode::Files => ("File paths (space separated):", InputCallbackId::AddFiles),
        InputMode::Archive => ("Export archive path:", InputCallbackId::AddFiles),
        InputMode::Urls => ("Page URLs (space or comma separated):", InputCallbackId::AddUrls),
        InputMode::Feed => ("Feed or sitemap URL:", InputCallbackId::FeedUrl),
        // 一覧取得は入力不要。
        InputMode::Notion => {
            let r = app.session.load_notion();
            report(app, "notion", r, |()| "listing notion pages...".into());
            return;
        }
        InputMode::Feishu => {
            let r = app.session.load_feishu();
            report(app, "feishu", r, |()| "listing feishu spaces...".into());
            return;
        }
    };
    app.input_box = Some(InputBoxState::new(prompt, "", id));
}

/// フォルダなら子の取得または開閉、それ以外は本文プレビュー。
fn open_current(app: &mut App) {
    let Some(item) = app.current_item() else {
        return;
    };
    if item.kind != ItemKind::Folder {
        app.ui.screen = Screen::Preview;
        return;
    }

    let key = item.key.clone();
    let expanded = item.expanded;
    let has_children = app
        .session
        .store()
        .items()
        .iter()
        .any(|i| i.kind != ItemKind::Folder && i.group_key == item.group_key);

    if has_children {
        app.session.store_mut().set_expanded(&key, !expanded);
    } else {
        let r = app.session.fetch_children(&key);
        report(app, "fetch", r, |()| "fetching folder...".into());
    }
}

/// 設定画面のキー処理。
fn handle_settings_key(app: &mut App, k: KeyEvent) {
    let sc = &app.shortcuts.settings;

    if matches_shortcut(&k, &sc.cancel) {
        // 編集中の値を破棄する。
        app.draft = app.cfg.clone();
        app.ui.screen = Screen::Main;
    } else if matches_shortcut(&k, &sc.save) {
        save_settings(app);
    } else if matches_shortcut(&k, &sc.source) {
        app.draft.import.source = app.draft.import.source.cycle();
    } else if let Some(input) = settings_input(app, &k) {
        app.input_box = Some(input);
    }
}

/// 押されたキーに対応する設定項目の入力ボックスを用意する。
fn settings_input(app: &App, k: &KeyEvent) -> Option<InputBoxState> {
    use InputCallbackId::*;

    let sc = &app.shortcuts.settings;
    let d = &app.draft;
    let fields = [
        (&sc.base_url, "Backend base URL:", d.server.base_url.clone(), BaseUrl),
        (&sc.kb_id, "Knowledge base id:", d.server.kb_id.clone(), KbId),
        (&sc.parent_id, "Parent node id (empty = root):", d.server.parent_id.clone(), ParentId),
        (
            &sc.max_concurrent,
            "Max concurrent tasks:",
            d.import.max_concurrent.to_string(),
            MaxConcurrent,
        ),
        (
            &sc.poll_interval,
            "Poll interval (ms):",
            d.import.poll_interval_ms.to_string(),
            PollInterval,
        ),
        (
            &sc.notion_token,
            "Notion integration token:",
            d.notion.integration_token.clone(),
            NotionToken,
        ),
        (&sc.feishu_app_id, "Feishu app id:", d.feishu.app_id.clone(), FeishuAppId),
        (
            &sc.feishu_app_secret,
            "Feishu app secret:",
            d.feishu.app_secret.clone(),
            FeishuAppSecret,
        ),
        (
            &sc.feishu_user_token,
            "Feishu user access token:",
            d.feishu.user_access_token.clone(),
            FeishuUserToken,
        ),
    ];
    fields
        .into_iter()
        .find(|(keys, ..)| matches_shortcut(k, keys))
        .map(|(_, prompt, value, id)| InputBoxState::new(prompt, value, id))
}

fn save_settings(app: &mut App) {
    if let Err(e) = app.draft.save(&app.cfg_path) {
        tracing::error!("failed to save {}: {e}", app.cfg_path.display());
        app.ui.error = Some(format!("save failed: {e}"));
        return;
    }
    let changed = app.draft != app.cfg;
    app.cfg = app.draft.clone();
    app.ui.screen = Screen::Main;
    app.ui.error = None;
    if changed {
        app.rebuild_session();
        app.ui.status = "Saved settings".into();
    } else {
        app.ui.status = "No changes".into();
    }
}

/// 入力ボックスのキー処理。
fn handle_input_box_key(app: &mut App, k: KeyEvent) {
    let Some(state) = app.input_box.as_mut() else {
        return;
    };
    let sc = &app.shortcuts.input_box;

    if matches_shortcut(&k, &sc.confirm) {
        let (id, value) = (state.callback_id, state.value.clone());
        app.input_box = None;
        apply_input(app, id, value);
    } else if matches_shortcut(&k, &sc.cancel) {
        app.input_box = None;
    } else if matches_shortcut(&k, &sc.backspace) {
        state.backspace();
    } else if matches_shortcut(&k, &sc.delete) {
        state.delete();
    } else if matches_shortcut(&k, &sc.left) {
        state.move_left();
    } else if matches_shortcut(&k, &sc.right) {
        state.move_right();
    } else if matches_shortcut(&k, &sc.home) {
        state.move_home();
    } else if matches_shortcut(&k, &sc.end) {
        state.move_end();
    } else if matches_shortcut(&k, &sc.clear_line) {
        state.clear_line();
    } else if let KeyCode::Char(c) = k.code
        && !k.modifiers.contains(KeyModifiers::CONTROL)
    {
        state.insert_char(c);
    }
}

/// 確定した入力値を反映する。
fn apply_input(app: &mut App, id: InputCallbackId, value: String) {
    let value = value.trim().to_string();
    match id {
        InputCallbackId::AddFiles => {
            let paths: Vec<PathBuf> = value.split_whitespace().map(PathBuf::from).collect();
            let r = app.session.add_files(paths);
            report(app, "add files", r, |n| format!("{n} files added"));
        }
        InputCallbackId::AddUrls => {
            let r = app.session.add_urls(&value);
            report(app, "add urls", r, |n| format!("{n} urls added"));
        }
        InputCallbackId::FeedUrl => {
            let r = app.session.load_feed(&value);
            report(app, "feed", r, |()| "listing feed...".into());
        }
        InputCallbackId::BaseUrl => app.draft.server.base_url = value,
        InputCallbackId::KbId => app.draft.server.kb_id = value,
        InputCallbackId::ParentId => app.draft.server.parent_id = value,
        InputCallbackId::MaxConcurrent => match value.parse::<usize>() {
            Ok(n) if n > 0 => app.draft.import.max_concurrent = n,
            _ => app.ui.error = Some(format!("not a positive number: {value}")),
        },
        InputCallbackId::PollInterval => match value.parse::<u64>() {
            Ok(ms) => app.draft.import.poll_interval_ms = ms,
            Err(_) => app.ui.error = Some(format!("not a number of milliseconds: {value}")),
        },
        InputCallbackId::NotionToken => app.draft.notion.integration_token = value,
        InputCallbackId::FeishuAppId => app.draft.feishu.app_id = value,
        InputCallbackId::FeishuAppSecret => app.draft.feishu.app_secret = value,
        InputCallbackId::FeishuUserToken => app.draft.feishu.user_access_token = value,
    }
}
