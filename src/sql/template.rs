//! SQL templates with request-time slots (`{where}`) and named placeholders (`:k0`).
//!
//! Quoted identifiers, string literals and `::` casts are copied verbatim, so table names
//! like `"a:b"` or `"{x}"` never look like placeholders.

use crate::error::AppError;
use crate::sql::BindValue;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SqlTemplate {
    pub text: String,
}

impl SqlTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        SqlTemplate { text: text.into() }
    }

    /// Slot names in order of appearance.
    pub fn slots(&self) -> Vec<String> {
        let mut out = Vec::new();
        scan(&self.text, |tok| {
            if let Token::Slot(name) = tok {
                out.push(name.to_string());
            }
        });
        out
    }

    /// Named placeholders in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        scan(&self.text, |tok| {
            if let Token::Placeholder(name) = tok {
                if !out.iter().any(|n| n == name) {
                    out.push(name.to_string());
                }
            }
        });
        out
    }

    /// Replace every `{slot}`. Missing slots are an internal error.
    pub fn fill(&self, slots: &HashMap<&str, String>) -> Result<SqlTemplate, AppError> {
        let mut out = String::with_capacity(self.text.len());
        let mut missing = None;
        scan(&self.text, |tok| match tok {
            Token::Slot(name) => match slots.get(name) {
                Some(fragment) => out.push_str(fragment),
                None => missing = Some(name.to_string()),
            },
            other => other.write_raw(&mut out),
        });
        if let Some(name) = missing {
            return Err(AppError::Internal(format!("unfilled template slot {{{}}}", name)));
        }
        Ok(SqlTemplate { text: out })
    }

    /// Rewrite named placeholders to `$n` in order of first appearance and collect their values.
    pub fn bind(&self, params: &HashMap<String, BindValue>) -> Result<(String, Vec<BindValue>), AppError> {
        let mut sql = String::with_capacity(self.text.len());
        let mut order: Vec<String> = Vec::new();
        let mut values = Vec::new();
        let mut missing = None;
        scan(&self.text, |tok| match tok {
            Token::Placeholder(name) => {
                let n = match order.iter().position(|o| o == name) {
                    Some(i) => i + 1,
                    None => {
                        match params.get(name) {
                            Some(v) => values.push(v.clone()),
                            None => missing = Some(name.to_string()),
                        }
                        order.push(name.to_string());
                        order.len()
                    }
                };
                sql.push('$');
                sql.push_str(&n.to_string());
            }
            other => other.write_raw(&mut sql),
        });
        if let Some(name) = missing {
            return Err(AppError::Internal(format!("no value for placeholder :{}", name)));
        }
        Ok((sql, values))
    }
}

enum Token<'a> {
    Text(&'a str),
    Slot(&'a str),
    Placeholder(&'a str),
}

impl Token<'_> {
    /// Append the token exactly as it appeared in the template.
    fn write_raw(&self, out: &mut String) {
        match self {
            Token::Text(s) => out.push_str(s),
            Token::Slot(name) => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            Token::Placeholder(name) => {
                out.push(':');
                out.push_str(name);
            }
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn scan<'a>(text: &'a str, mut emit: impl FnMut(Token<'a>)) {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut start = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                // Doubled quotes inside the literal are handled by re-entering the loop.
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' if bytes.get(i + 1).copied().is_some_and(is_ident_start) => {
                if start < i {
                    emit(Token::Text(&text[start..i]));
                }
                let name_start = i + 1;
                let mut j = name_start;
                while j < bytes.len() && is_ident(bytes[j]) {
                    j += 1;
                }
                emit(Token::Placeholder(&text[name_start..j]));
                i = j;
                start = j;
            }
            b'{' => {
                let name_start = i + 1;
                let mut j = name_start;
                while j < bytes.len() && is_ident(bytes[j]) {
                    j += 1;
                }
                if j > name_start && bytes.get(j) == Some(&b'}') {
                    if start < i {
                        emit(Token::Text(&text[start..i]));
                    }
                    emit(Token::Slot(&text[name_start..j]));
                    i = j + 1;
                    start = i;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        emit(Token::Text(&text[start..]));
    }
}
