//! Fixed-offset column shifting for A1 references inside formula text.
//!
//! This is not a formula parser. It walks the text once, copies string literals,
//! bracketed structured references, function names and numbers through
//! untouched, and rewrites only tokens that read as cell references
//! (`B7`, `$C$2`) or column ranges (`D:F`).

use super::reference::{CellRef, col_to_name, name_to_col, shift_column};

/// One column insertion on `target_sheet`: columns `>= at` move right by `delta`.
#[derive(Debug, Clone, Copy)]
pub struct ColumnShift<'a> {
    pub target_sheet: &'a str,
    pub at: u32,
    pub delta: u32,
}

impl ColumnShift<'_> {
    /// Rewrites `formula` as it appears on `host_sheet`.
    ///
    /// Unqualified references are shifted only when the formula lives on the
    /// target sheet; qualified ones only when they name it.
    pub fn apply(&self, formula: &str, host_sheet: &str) -> String {
        let chars: Vec<char> = formula.chars().collect();
        let local = same_sheet(host_sheet, self.target_sheet);
        let mut out = String::with_capacity(formula.len() + 4);
        // Some(true/false) while inside a `Sheet!A1:B2` reference: whether it targets us.
        let mut qualified: Option<bool> = None;
        let mut i = 0usize;

        while let Some(&ch) = chars.get(i) {
            match ch {
                '"' => {
                    let end = skip_string(&chars, i);
                    out.extend(&chars[i..end]);
                    i = end;
                    qualified = None;
                }
                '[' => {
                    let end = skip_brackets(&chars, i);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '\'' => {
                    let end = skip_quoted_name(&chars, i);
                    if chars.get(end) == Some(&'!') {
                        let name = unquote(&chars[i..end]);
                        qualified = Some(same_sheet(&name, self.target_sheet));
                        out.extend(&chars[i..=end]);
                        i = end + 1;
                    } else {
                        out.extend(&chars[i..end]);
                        i = end;
                        qualified = None;
                    }
                }
                ':' => {
                    out.push(ch);
                    i += 1;
                }
                c if c.is_ascii_digit() => {
                    let end = scan_word(&chars, i);
                    out.extend(&chars[i..end]);
                    i = end;
                    qualified = None;
                }
                c if is_word_start(c) => {
                    let end = scan_word(&chars, i);
                    let word: String = chars[i..end].iter().collect();
                    match chars.get(end) {
                        Some('(') | Some('[') => {
                            out.push_str(&word);
                            qualified = None;
                            i = end;
                        }
                        Some('!') => {
                            let external = i > 0 && chars[i - 1] == ']';
                            qualified = Some(!external && same_sheet(&word, self.target_sheet));
                            out.push_str(&word);
                            out.push('!');
                            i = end + 1;
                        }
                        _ => {
                            let applies = qualified.unwrap_or(local);
                            let (text, consumed) = self.rewrite_reference(&chars, i, &word, end, applies);
                            out.push_str(&text);
                            i = consumed;
                            if chars.get(i) != Some(&':') {
                                qualified = None;
                            }
                        }
                    }
                }
                _ => {
                    out.push(ch);
                    i += 1;
                    qualified = None;
                }
            }
        }
        out
    }

    /// Rewrites the word at `chars[start..end]`; a column-only word followed by `:` and a
    /// second column-only word is treated as one column range.
    fn rewrite_reference(
        &self,
        chars: &[char],
        start: usize,
        word: &str,
        end: usize,
        applies: bool,
    ) -> (String, usize) {
        if let Some(cell) = parse_cell(word) {
            if !applies {
                return (word.to_string(), end);
            }
            return (cell.shift_columns(self.at, self.delta).to_string(), end);
        }

        if let Some(first) = parse_column(word)
            && chars.get(end) == Some(&':')
            && chars.get(end + 1).is_some_and(|c| is_word_start(*c))
        {
            let second_end = scan_word(chars, end + 1);
            let second_word: String = chars[end + 1..second_end].iter().collect();
            if let Some(second) = parse_column(&second_word) {
                if !applies {
                    let text: String = chars[start..second_end].iter().collect();
                    return (text, second_end);
                }
                let text = format!(
                    "{}:{}",
                    self.format_column(first),
                    self.format_column(second)
                );
                return (text, second_end);
            }
        }
        (word.to_string(), end)
    }

    fn format_column(&self, (col, absolute): (u32, bool)) -> String {
        format!(
            "{}{}",
            if absolute { "$" } else { "" },
            col_to_name(shift_column(col, self.at, self.delta))
        )
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '\\' || c == '$'
}

fn scan_word(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while chars
        .get(i)
        .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '\\'))
    {
        i += 1;
    }
    i
}

/// Index just past the closing quote of the string literal starting at `start`.
fn skip_string(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while let Some(&ch) = chars.get(i) {
        i += 1;
        if ch == '"' {
            if chars.get(i) == Some(&'"') {
                i += 1;
                continue;
            }
            break;
        }
    }
    i
}

fn skip_brackets(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while let Some(&ch) = chars.get(i) {
        i += 1;
        match ch {
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    i
}

fn skip_quoted_name(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while let Some(&ch) = chars.get(i) {
        i += 1;
        if ch == '\'' {
            if chars.get(i) == Some(&'\'') {
                i += 1;
                continue;
            }
            break;
        }
    }
    i
}

fn unquote(quoted: &[char]) -> String {
    let inner: String = quoted
        .iter()
        .skip(1)
        .take(quoted.len().saturating_sub(2))
        .collect();
    inner.replace("''", "'")
}

fn same_sheet(a: &str, b: &str) -> bool {
    // A `[1]Sheet` external prefix never names a sheet of this workbook.
    !a.starts_with('[') && a.to_lowercase() == b.to_lowercase()
}

fn parse_cell(word: &str) -> Option<CellRef> {
    if !word.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    CellRef::parse(word).ok()
}

fn parse_column(word: &str) -> Option<(u32, bool)> {
    let (absolute, letters) = match word.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, word),
    };
    name_to_col(letters).map(|col| (col, absolute))
}
