//! ショートカット設定（`shortcut.toml`）とキー判定。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ショートカット設定の全体。セクション単位で省略可能。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Shortcuts {
    pub main: MainShortcuts,
    pub settings: SettingsShortcuts,
    pub preview: PreviewShortcuts,
    pub input_box: InputBoxShortcuts,
}

/// 一覧画面。各操作はセッションの一括操作に対応する。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MainShortcuts {
    pub quit: Vec<String>,
    pub settings: Vec<String>,
    pub add: Vec<String>,
    pub select: Vec<String>,
    pub select_all: Vec<String>,
    pub clear_selection: Vec<String>,
    pub upload: Vec<String>,
    pub pull: Vec<String>,
    pub create: Vec<String>,
    pub abort: Vec<String>,
    pub delete: Vec<String>,
    pub retry: Vec<String>,
    pub reset: Vec<String>,
    /// フォルダ展開 / 本文プレビュー
    pub enter: Vec<String>,
    pub down: Vec<String>,
    pub up: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsShortcuts {
    pub cancel: Vec<String>,
    pub save: Vec<String>,
    pub base_url: Vec<String>,
    pub kb_id: Vec<String>,
    pub parent_id: Vec<String>,
    pub source: Vec<String>,
    pub max_concurrent: Vec<String>,
    pub poll_interval: Vec<String>,
    pub notion_token: Vec<String>,
    pub feishu_app_id: Vec<String>,
    pub feishu_app_secret: Vec<String>,
    pub feishu_user_token: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewShortcuts {
    pub close: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputBoxShortcuts {
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
    pub backspace: Vec<String>,
    pub delete: Vec<String>,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub home: Vec<String>,
    pub end: Vec<String>,
    pub clear_line: Vec<String>,
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for MainShortcuts {
    fn default() -> Self {
        Self {
            quit: keys(&["q"]),
            settings: keys(&["t"]),
            add: keys(&["a"]),
            select: keys(&["Space"]),
            select_all: keys(&["Ctrl+a"]),
            clear_selection: keys(&["Esc"]),
            upload: keys(&["u"]),
            pull: keys(&["p"]),
            create: keys(&["c"]),
            abort: keys(&["x"]),
            delete: keys(&["d"]),
            retry: keys(&["Shift+R", "R"]),
            reset: keys(&["Ctrl+r"]),
            enter: keys(&["Enter"]),
            down: keys(&["Down", "j"]),
            up: keys(&["Up", "k"]),
        }
    }
}

impl Default for SettingsShortcuts {
    fn default() -> Self {
        Self {
            cancel: keys(&["Esc"]),
            save: keys(&["Enter"]),
            base_url: keys(&["b"]),
            kb_id: keys(&["k"]),
            parent_id: keys(&["p"]),
            source: keys(&["s"]),
            max_concurrent: keys(&["m"]),
            poll_interval: keys(&["w"]),
            notion_token: keys(&["n"]),
            feishu_app_id: keys(&["f"]),
            feishu_app_secret: keys(&["g"]),
            feishu_user_token: keys(&["o"]),
        }
    }
}

impl Default for PreviewShortcuts {
    fn default() -> Self {
        Self {
            close: keys(&["Esc", "Enter", "q"]),
        }
    }
}

impl Default for InputBoxShortcuts {
    fn default() -> Self {
        Self {
            confirm: keys(&["Enter"]),
            cancel: keys(&["Esc"]),
            backspace: keys(&["Backspace"]),
            delete: keys(&["Delete"]),
            left: keys(&["Left"]),
            right: keys(&["Right"]),
            home: keys(&["Home"]),
            end: keys(&["End"]),
            clear_line: keys(&["Ctrl+u"]),
        }
    }
}

impl Shortcuts {
    /// TOMLから読み込み、無ければデフォルトを返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// KeyEventがいずれかのショートカット文字列と一致するか判定する。
pub fn matches_shortcut(key: &KeyEvent, shortcuts: &[String]) -> bool {
    shortcuts
        .iter()
        .filter_map(|s| parse_shortcut(s))
        .any(|(mods, code)| key.modifiers == mods && key.code == code)
}

/// "Ctrl+u" / "Enter" / "a" 形式を (修飾キー, キーコード) へ分解する。
fn parse_shortcut(shortcut: &str) -> Option<(KeyModifiers, KeyCode)> {
    let (mod_part, key_part) = match shortcut.rsplit_once('+') {
        // "+" 単体や末尾 "+" はキーそのものとして扱う
        Some((m, k)) if !k.is_empty() => (Some(m), k),
        _ => (None, shortcut),
    };

    let mut mods = KeyModifiers::empty();
    for m in mod_part.into_iter().flat_map(|m| m.split('+')) {
        mods |= match m.to_ascii_lowercase().as_str() {
            "ctrl" => KeyModifiers::CONTROL,
            "alt" => KeyModifiers::ALT,
            "shift" => KeyModifiers::SHIFT,
            _ => return None,
        };
    }

    let code = match key_part.to_ascii_lowercase().as_str() {
        "enter" => KeyCode::Enter,
        "esc" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "space" => KeyCode::Char(' '),
        "backspace" => KeyCode::Backspace,
        "delete" => KeyCode::Delete,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        // 単一文字は大文字小文字を区別する
        _ => {
            let mut chars = key_part.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::Char(c),
                _ => return None,
            }
        }
    };
    Some((mods, code))
}

/// 表示用に複数キーを "/" で連結する。
pub fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn simple_char() {
        let k = key(KeyCode::Char('u'), KeyModifiers::empty());
        assert!(matches_shortcut(&k, &keys(&["u"])));
        assert!(!matches_shortcut(&k, &keys(&["p"])));
    }

    #[test]
    fn special_keys() {
        let k = key(KeyCode::Enter, KeyModifiers::empty());
        assert!(matches_shortcut(&k, &keys(&["Enter"])));
        assert!(matches_shortcut(&k, &keys(&["enter"])));
        assert!(!matches_shortcut(&k, &keys(&["Esc"])));

        let space = key(KeyCode::Char(' '), KeyModifiers::empty());
        assert!(matches_shortcut(&space, &keys(&["Space"])));
    }

    #[test]
    fn modifiers_must_match_exactly() {
        let k = key(KeyCode::Char('a'), KeyModifiers::CONTROL);
        assert!(matches_shortcut(&k, &keys(&["Ctrl+a"])));
        assert!(!matches_shortcut(&k, &keys(&["a"])));

        let shifted = key(KeyCode::Char('R'), KeyModifiers::SHIFT);
        let retry = MainShortcuts::default().retry;
        assert!(matches_shortcut(&shifted, &retry));
        assert!(matches_shortcut(&key(KeyCode::Char('R'), KeyModifiers::empty()), &retry));
        assert!(!matches_shortcut(&key(KeyCode::Char('r'), KeyModifiers::empty()), &retry));
    }

    #[test]
    fn any_of_several_bindings() {
        let bindings = keys(&["Up", "k"]);
        assert!(matches_shortcut(&key(KeyCode::Up, KeyModifiers::empty()), &bindings));
        assert!(matches_shortcut(&key(KeyCode::Char('k'), KeyModifiers::empty()), &bindings));
        assert!(!matches_shortcut(&key(KeyCode::Char('j'), KeyModifiers::empty()), &bindings));
    }

    #[test]
    fn malformed_bindings_never_match() {
        let k = key(KeyCode::Char('x'), KeyModifiers::empty());
        assert!(!matches_shortcut(&k, &keys(&["Hyper+x", "xx", ""])));
        assert_eq!(parse_shortcut("+"), Some((KeyModifiers::empty(), KeyCode::Char('+'))));
    }

    #[test]
    fn default_main_bindings_do_not_collide() {
        let m = MainShortcuts::default();
        let all = [
            &m.quit, &m.settings, &m.add, &m.select, &m.select_all, &m.clear_selection,
            &m.upload, &m.pull, &m.create, &m.abort, &m.delete, &m.retry, &m.reset, &m.enter,
            &m.down, &m.up,
        ];
        let mut seen = HashSet::new();
        for binding in all.iter().flat_map(|b| b.iter()) {
            assert!(seen.insert(parse_shortcut(binding)), "{binding} bound twice");
        }
    }

    #[test]
    fn partial_file_falls_back_per_section() {
        let s: Shortcuts = toml::from_str("[main]\nquit = [\"Esc\"]\n").unwrap();
        assert_eq!(s.main.quit, keys(&["Esc"]));
        assert_eq!(s.main.upload, keys(&["u"]));
        assert_eq!(s.settings.save, keys(&["Enter"]));
    }
}
