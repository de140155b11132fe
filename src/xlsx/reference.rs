use std::fmt;

use super::{MAX_COLUMN, MAX_ROW, XlsxError, XlsxResult};

/// Converts a 1-based column index to its letters (`1` -> `A`, `28` -> `AB`).
pub fn col_to_name(col: u32) -> String {
    let mut col = col.max(1);
    let mut rev = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        rev.push((b'A' + rem) as char);
        col = (col - 1) / 26;
    }
    rev.into_iter().rev().collect()
}

/// Parses column letters (case-insensitive) into a 1-based index within the sheet bounds.
pub fn name_to_col(name: &str) -> Option<u32> {
    if name.is_empty() || name.len() > 3 {
        return None;
    }
    let mut out = 0u32;
    for ch in name.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let upper = ch.to_ascii_uppercase() as u8;
        out = out * 26 + u32::from(upper - b'A' + 1);
    }
    (out <= MAX_COLUMN).then_some(out)
}

/// Applies a column insertion of `delta` columns at `at` to a single column index.
pub fn shift_column(col: u32, at: u32, delta: u32) -> u32 {
    if col >= at {
        (col + delta).min(MAX_COLUMN)
    } else {
        col
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub col: u32,
    pub row: u32,
    pub col_absolute: bool,
    pub row_absolute: bool,
}

impl CellRef {
    pub fn new(col: u32, row: u32) -> Self {
        Self {
            col,
            row,
            col_absolute: false,
            row_absolute: false,
        }
    }

    pub fn parse(text: &str) -> XlsxResult<Self> {
        let invalid = || XlsxError::InvalidReference(text.to_string());
        let mut rest = text.trim();
        let col_absolute = rest.starts_with('$');
        if col_absolute {
            rest = &rest[1..];
        }
        let letters = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let col = name_to_col(&rest[..letters]).ok_or_else(invalid)?;
        rest = &rest[letters..];
        let row_absolute = rest.starts_with('$');
        if row_absolute {
            rest = &rest[1..];
        }
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let row: u32 = rest.parse().map_err(|_| invalid())?;
        if row == 0 || row > MAX_ROW {
            return Err(invalid());
        }
        Ok(Self {
            col,
            row,
            col_absolute,
            row_absolute,
        })
    }

    pub fn shift_columns(self, at: u32, delta: u32) -> Self {
        Self {
            col: shift_column(self.col, at, delta),
            ..self
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.col_absolute { "$" } else { "" },
            col_to_name(self.col),
            if self.row_absolute { "$" } else { "" },
            self.row
        )
    }
}

/// A rectangular `A1:B2` range. A single-cell reference parses as a range whose ends coincide
/// and formats back to the single-cell form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRef {
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeRef {
    pub fn parse(text: &str) -> XlsxResult<Self> {
        match text.trim().split_once(':') {
            Some((a, b)) => Ok(Self {
                start: CellRef::parse(a)?,
                end: CellRef::parse(b)?,
            }),
            None => {
                let cell = CellRef::parse(text)?;
                Ok(Self {
                    start: cell,
                    end: cell,
                })
            }
        }
    }

    pub fn shift_columns(self, at: u32, delta: u32) -> Self {
        Self {
            start: self.start.shift_columns(at, delta),
            end: self.end.shift_columns(at, delta),
        }
    }

    pub fn with_end_col(self, col: u32) -> Self {
        Self {
            end: CellRef { col, ..self.end },
            ..self
        }
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Shifts every range of a space-separated `sqref` list.
pub fn shift_sqref(sqref: &str, at: u32, delta: u32) -> XlsxResult<String> {
    let shifted = sqref
        .split_whitespace()
        .map(|token| RangeRef::parse(token).map(|r| r.shift_columns(at, delta).to_string()))
        .collect::<XlsxResult<Vec<_>>>()?;
    Ok(shifted.join(" "))
}

/// Inclusive `min..=max` column span as used by `<col>` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpan {
    pub min: u32,
    pub max: u32,
}

impl ColumnSpan {
    pub fn contains(&self, col: u32) -> bool {
        self.min <= col && col <= self.max
    }
}
