//! TUIのイベントループと状態管理。

mod handlers;
mod render;

use anyhow::Result;
use crossterm::event::{self, Event};
use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    backend::HttpBackend,
    config::Config,
    events::UiState,
    input::InputBoxState,
    items::{Item, ItemKind},
    session::ImportSession,
    shortcuts::Shortcuts,
    ui::Tui,
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// 終了時に実行中タスクの中断を待つ上限。
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// 入力処理と描画で共有するアプリ状態。
pub struct App {
    pub cfg_path: PathBuf,
    /// 保存済みの設定（セッションはこれで構築されている）。
    pub cfg: Config,
    /// 設定画面で編集中の値。保存で `cfg` へ反映する。
    pub draft: Config,
    pub ui: UiState,
    pub session: ImportSession,
    /// 入力中のみSome。
    pub input_box: Option<InputBoxState>,
    pub shortcuts: Shortcuts,
}

impl App {
    /// 折りたたまれたフォルダの子を除いた表示行。
    pub fn visible_items(&self) -> Vec<&Item> {
        let items = self.session.store().items();
        items
            .iter()
            .filter(|item| {
                if item.kind == ItemKind::Folder {
                    return true;
                }
                let Some(group) = &item.group_key else {
                    return true;
                };
                items
                    .iter()
                    .find(|f| f.kind == ItemKind::Folder && f.group_key.as_ref() == Some(group))
                    .is_none_or(|f| f.expanded)
            })
            .collect()
    }

    /// カーソル行のアイテム。
    pub fn current_item(&self) -> Option<&Item> {
        self.visible_items().get(self.ui.cursor).copied()
    }

    pub fn current_key(&self) -> Option<String> {
        self.current_item().map(|i| i.key.clone())
    }

    /// セッションからの通知をログへ流し込み、カーソルを補正する。
    fn drain_session(&mut self) {
        for notice in self.session.pump() {
            self.ui.push_log(notice);
        }
        let rows = self.visible_items().len();
        self.ui.clamp_cursor(rows);
    }

    /// 設定変更後にセッションを作り直す。既存のアイテムは破棄される。
    pub fn rebuild_session(&mut self) {
        let dropped = self.session.store().len();
        self.session.reset();
        self.session = build_session(&self.cfg);
        self.ui.cursor = 0;
        if dropped > 0 {
            self.ui.push_log(format!("session restarted, {dropped} items dropped"));
        }
        tracing::info!(
            "session rebuilt: source={} kb={}",
            self.cfg.import.source,
            self.cfg.server.kb_id
        );
    }
}

fn build_session(cfg: &Config) -> ImportSession {
    let backend = Arc::new(HttpBackend::new(cfg.server.base_url.as_str()));
    ImportSession::new(cfg, backend)
}

/// ユーザーが終了するまでメインTUIループを回す。
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    let cfg_path = PathBuf::from("config.toml");
    let cfg = Config::load_or_default(&cfg_path)?;
    let shortcuts = Shortcuts::load_or_default("shortcut.toml")?;

    let mut app = App {
        cfg_path,
        draft: cfg.clone(),
        session: build_session(&cfg),
        cfg,
        ui: UiState::default(),
        input_box: None,
        shortcuts,
    };
    if app.cfg.server.kb_id.is_empty() {
        app.ui.status = "Knowledge base id required (press t)".into();
    }
    app.ui.push_log(format!("source: {}", app.session.source()));

    loop {
        app.drain_session();
        terminal.draw(|f| draw(f, &app))?;

        // 応答性のため短いタイムアウトで入力をポーリングする。
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            if is_ctrl_c(&k) || handle_key(&mut app, k) {
                break;
            }
        }
    }

    shutdown(&mut app).await;
    Ok(())
}

/// 実行中のタスクを中断し、後片付けが終わるまで少しだけ待つ。
async fn shutdown(app: &mut App) {
    let total = app.session.queue().total();
    if total == 0 {
        return;
    }
    tracing::info!("aborting {total} tasks before exit");
    app.session.abort_all();
    if tokio::time::timeout(SHUTDOWN_GRACE, app.session.settle())
        .await
        .is_err()
    {
        tracing::warn!("tasks still running after {SHUTDOWN_GRACE:?}, exiting anyway");
    }
}
