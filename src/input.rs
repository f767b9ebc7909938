//! 1行入力のポップアップ（InputBox）。

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::layout;

/// 入力確定時に値をどこへ反映するか。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputCallbackId {
    // メイン画面: アイテム投入
    AddFiles,
    AddUrls,
    FeedUrl,

    // 設定画面
    BaseUrl,
    KbId,
    ParentId,
    MaxConcurrent,
    PollInterval,
    NotionToken,
    FeishuAppId,
    FeishuAppSecret,
    FeishuUserToken,
}

impl InputCallbackId {
    /// 秘密情報は伏せ字で表示する。
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            InputCallbackId::NotionToken
                | InputCallbackId::FeishuAppSecret
                | InputCallbackId::FeishuUserToken
        )
    }
}

#[derive(Clone, Debug)]
pub struct InputBoxState {
    pub prompt: String,
    pub value: String,
    /// カーソル位置（文字単位）
    pub cursor: usize,
    pub callback_id: InputCallbackId,
}

impl InputBoxState {
    /// 既存値を持った状態で開く。カーソルは末尾。
    pub fn new(
        prompt: impl Into<String>,
        value: impl Into<String>,
        callback_id: InputCallbackId,
    ) -> Self {
        let value = value.into();
        Self {
            prompt: prompt.into(),
            cursor: value.chars().count(),
            value,
            callback_id,
        }
    }

    /// 文字位置をバイト位置へ変換する。
    fn byte_at(&self, char_idx: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_idx)
            .map(|(b, _)| b)
            .unwrap_or(self.value.len())
    }

    fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_at(self.cursor);
        self.value.insert(at, c);
        self.cursor += 1;
    }

    /// カーソル前の1文字を削除
    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_at(self.cursor);
        self.value.remove(at);
    }

    /// カーソル位置の1文字を削除
    pub fn delete(&mut self) {
        if self.cursor < self.len() {
            let at = self.byte_at(self.cursor);
            self.value.remove(at);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.len());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.len();
    }

    pub fn clear_line(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    /// 表示幅 `width` に収まる可視部分と、その中でのカーソル位置。
    fn visible(&self, width: usize) -> (String, usize) {
        let shown: Vec<char> = if self.callback_id.is_secret() {
            vec!['*'; self.len()]
        } else {
            self.value.chars().collect()
        };
        // カーソルが右端を越えたら横スクロールする。
        let room = width.saturating_sub(1).max(1);
        let offset = self.cursor.saturating_sub(room);
        let text = shown.iter().skip(offset).take(room).collect();
        (text, self.cursor - offset)
    }
}

/// InputBoxをポップアップとして描画
pub fn render_input_box(f: &mut Frame, state: &InputBoxState) {
    let popup_area = layout::centered_popup(f.area(), 70, 7);
    f.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Input")
        .style(Style::default().bg(Color::DarkGray));
    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    let [prompt_area, field_area, _, help_area] =
        Layout::vertical([Constraint::Length(1); 4]).areas(inner);

    f.render_widget(
        Paragraph::new(state.prompt.as_str()).style(Style::default().fg(Color::Cyan).bold()),
        prompt_area,
    );

    // カーソル位置に "|" を差し込んで表示する。
    let (text, at) = state.visible(field_area.width as usize);
    let before: String = text.chars().take(at).collect();
    let after: String = text.chars().skip(at).collect();
    f.render_widget(
        Paragraph::new(format!("{before}|{after}")).style(Style::default().fg(Color::Green)),
        field_area,
    );

    f.render_widget(
        Paragraph::new("Enter=確定 | ESC=キャンセル | Ctrl+U=クリア")
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center),
        help_area,
    );
}
