//! 画面種別と描画側と共有するUI状態。

/// ログパネルに保持する最大行数。
const LOG_CAPACITY: usize = 200;

/// TUIで現在表示中の画面。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    /// アイテム一覧画面。
    Main,
    /// 設定編集画面。
    Settings,
    /// 選択アイテムの取得済み本文プレビュー。
    Preview,
}

/// 描画側と共有するUI状態。
#[derive(Clone, Debug)]
pub struct UiState {
    pub screen: Screen,
    /// 表示行ベースのカーソル位置。
    pub cursor: usize,
    /// 右側パネルに表示するログ（古い順）。
    pub log: Vec<String>,
    /// 画面下部のステータス文言。
    pub status: String,
    /// 直近の操作エラー（赤字表示）。
    pub error: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            screen: Screen::Main,
            cursor: 0,
            log: Vec::new(),
            status: "Ready".into(),
            error: None,
        }
    }
}

impl UiState {
    /// 時刻付きでログを1行追加する。
    pub fn push_log(&mut self, line: impl AsRef<str>) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.log.push(format!("{stamp} {}", line.as_ref()));
        if self.log.len() > LOG_CAPACITY {
            let excess = self.log.len() - LOG_CAPACITY;
            self.log.drain(..excess);
        }
    }

    /// 直近 `n` 行のログ。
    pub fn log_tail(&self, n: usize) -> &[String] {
        &self.log[self.log.len().saturating_sub(n)..]
    }

    /// カーソルを `len` 行の範囲に収める。
    pub fn clamp_cursor(&mut self, len: usize) {
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }
}
