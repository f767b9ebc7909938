//! レイアウト計算のヘルパー関数

use ratatui::prelude::*;

/// メイン画面の縦方向の領域
pub struct MainLayout {
    /// 集計バー（件数・同時実行数）
    pub summary_bar: Rect,
    /// アイテム一覧 + INFOパネル
    pub body: Rect,
    pub help_bar: Rect,
    pub status_bar: Rect,
}

/// ボディ部の横方向の領域
pub struct BodyLayout {
    pub items_table: Rect,
    pub info_panel: Rect,
}

pub fn create_main_layout(area: Rect) -> MainLayout {
    let [summary_bar, body, help_bar, status_bar] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(1),
        Constraint::Length(3),
        Constraint::Length(3),
    ])
    .areas(area);

    MainLayout {
        summary_bar,
        body,
        help_bar,
        status_bar,
    }
}

/// 一覧 65% / INFO 35%
pub fn create_body_layout(area: Rect) -> BodyLayout {
    let [items_table, info_panel] =
        Layout::horizontal([Constraint::Percentage(65), Constraint::Percentage(35)]).areas(area);

    BodyLayout {
        items_table,
        info_panel,
    }
}

/// 中央寄せのポップアップ領域（幅は%指定、高さは行数指定）
pub fn centered_popup(area: Rect, width_percent: u16, height: u16) -> Rect {
    let [_, row, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height),
        Constraint::Fill(1),
    ])
    .areas(area);
    let [_, popup, _] = Layout::horizontal([
        Constraint::Percentage((100 - width_percent) / 2),
        Constraint::Percentage(width_percent),
        Constraint::Percentage((100 - width_percent) / 2),
    ])
    .areas(row);
    popup
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_layout_reserves_fixed_bars() {
        let l = create_main_layout(Rect::new(0, 0, 100, 40));
        assert_eq!(l.summary_bar.height, 3);
        assert_eq!(l.help_bar.height, 3);
        assert_eq!(l.status_bar.height, 3);
        assert_eq!(l.body.height, 31);
    }

    #[test]
    fn popup_is_centered() {
        let p = centered_popup(Rect::new(0, 0, 100, 21), 70, 7);
        assert_eq!(p.height, 7);
        assert_eq!(p.y, 7);
        assert_eq!(p.width, 70);
    }
}
