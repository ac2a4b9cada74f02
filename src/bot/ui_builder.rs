//! UI Builder module for creating keyboards and formatting messages

use crate::access::Access;
use crate::fiber::{FieldList, Group};
use crate::localization::t_args;
use crate::lookup::{Category, NO_DATA};

use super::transport::Keyboard;

// Button labels are matched literally against incoming text
pub const LABEL_SEARCH: &str = "Поиск счётчика";
pub const LABEL_HELP: &str = "Справка";
pub const LABEL_BROADCAST: &str = "Уведомить всех";
pub const LABEL_FIBER: &str = "ВОЛС";
pub const LABEL_FIBER_BY_STATION: &str = "Поиск по ТП";
pub const LABEL_FIBER_BY_PROVIDER: &str = "Поиск по провайдеру";
pub const LABEL_BACK: &str = "Назад";

/// Telegram rejects messages longer than 4096 characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

fn row(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

/// Main menu, with broadcast and fiber buttons only for users who may use them
pub fn main_menu_keyboard(access: &Access, fiber_available: bool) -> Keyboard {
    let mut rows = vec![row(&[LABEL_SEARCH, LABEL_HELP])];
    if fiber_available {
        rows.push(row(&[LABEL_FIBER]));
    }
    if access.scope.can_broadcast() {
        rows.push(row(&[LABEL_BROADCAST]));
    }
    Keyboard::Reply(rows)
}

/// Category selection for a resolved record
pub fn category_keyboard(inline: bool) -> Keyboard {
    if inline {
        Keyboard::Inline(
            Category::ALL
                .iter()
                .map(|c| vec![(c.label().to_string(), c.callback_data().to_string())])
                .collect(),
        )
    } else {
        let mut rows: Vec<Vec<String>> = Category::ALL
            .iter()
            .map(|c| vec![c.label().to_string()])
            .collect();
        rows.push(row(&[LABEL_BACK]));
        Keyboard::Reply(rows)
    }
}

pub fn back_keyboard() -> Keyboard {
    Keyboard::Reply(vec![row(&[LABEL_BACK])])
}

/// One button per label, then Back
pub fn list_keyboard<I, S>(labels: I) -> Keyboard
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut rows: Vec<Vec<String>> = labels.into_iter().map(|l| vec![l.into()]).collect();
    rows.push(row(&[LABEL_BACK]));
    Keyboard::Reply(rows)
}

pub fn fiber_menu_keyboard() -> Keyboard {
    Keyboard::Reply(vec![
        row(&[LABEL_FIBER_BY_STATION, LABEL_FIBER_BY_PROVIDER]),
        row(&[LABEL_BACK]),
    ])
}

/// Button label of a group: `"name (count)"`
pub fn group_label(group: &Group) -> String {
    format!("{} ({})", group.name, group.count)
}

/// Match a pressed group button (or the bare name typed by hand) to one of `names`
pub fn pick_group<'a>(text: &str, names: &'a [String]) -> Option<&'a String> {
    let text = text.trim();
    names.iter().find(|name| {
        text == name.as_str()
            || text
                .strip_prefix(name.as_str())
                .map(|rest| {
                    let rest = rest.trim();
                    rest.starts_with('(')
                        && rest.ends_with(')')
                        && rest[1..rest.len() - 1].chars().all(|c| c.is_ascii_digit())
                })
                .unwrap_or(false)
    })
}

/// `field: value` lines, placeholder for missing values
pub fn format_fields<S: AsRef<str>>(fields: &[(S, Option<String>)]) -> String {
    fields
        .iter()
        .map(|(name, value)| {
            format!("{}: {}", name.as_ref(), value.as_deref().unwrap_or(NO_DATA))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered blocks for a list of fiber rows
pub fn format_fiber_rows(rows: &[FieldList]) -> String {
    let total = rows.len().to_string();
    rows.iter()
        .enumerate()
        .map(|(i, fields)| {
            format!(
                "{}\n{}",
                t_args(
                    "fiber-contract-header",
                    &[("index", &(i + 1).to_string()), ("total", &total)]
                ),
                format_fields(fields)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split text into chunks under the Telegram limit, preferring line breaks
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        if current_len > 0 && current_len + 1 + line_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            // A single overlong line is cut on character boundaries
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                if current_len > 0 {
                    chunks.push(std::mem::take(&mut current));
                }
                current = piece.iter().collect();
                current_len = piece.len();
            }
            continue;
        }
        if current_len > 0 {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}
