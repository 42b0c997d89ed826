//! Query-string grammar: plain `col=value` equality plus `_where`, `_sort`, `_fields`,
//! `_limit`, `_offset`, `_p` and `_include`. Parsing here knows nothing about the catalog.

use crate::error::AppError;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

/// Every `_` parameter the grammar knows. Which of them a route reads depends on its kind.
pub const RESERVED_PARAMS: &[&str] = &["_where", "_sort", "_fields", "_include", "_limit", "_offset", "_p"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    pub fn sql(self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    Between,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    fn parse(op: &str, value: &str) -> Result<FilterOp, AppError> {
        Ok(match op {
            "eq" => FilterOp::Eq,
            "ne" => FilterOp::Ne,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "like" => FilterOp::Like,
            "nlike" => FilterOp::NotLike,
            "in" => FilterOp::In,
            "btw" => FilterOp::Between,
            "is" => match value {
                "null" => FilterOp::IsNull,
                "notnull" => FilterOp::IsNotNull,
                _ => return Err(AppError::Validation(format!("is expects null or notnull, got '{}'", value))),
            },
            _ => return Err(AppError::Validation(format!("unknown operator '{}'", op))),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::NotLike => "nlike",
            FilterOp::In => "in",
            FilterOp::Between => "btw",
            FilterOp::IsNull | FilterOp::IsNotNull => "is",
        }
    }
}

/// One `(col,op,value)` term of `_where`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    /// How this term joins the terms before it. The first term's conjunction is ignored.
    pub conjunction: Conjunction,
    pub column: String,
    pub op: FilterOp,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// `col=value` pairs in order of appearance.
    pub equals: Vec<(String, String)>,
    /// `_where` terms, folded left to right.
    pub conditions: Vec<Condition>,
    pub sort: Vec<SortKey>,
    pub fields: Option<Vec<String>>,
    pub includes: Vec<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub page: Option<i64>,
    /// Reserved parameters present in the query, in order of first appearance.
    pub reserved: Vec<&'static str>,
}

impl QueryOptions {
    pub fn parse(query: &[(String, String)]) -> Result<QueryOptions, AppError> {
        let mut out = QueryOptions::default();
        for (key, value) in query {
            if let Some(name) = RESERVED_PARAMS.iter().find(|r| **r == key.as_str()) {
                if !out.reserved.contains(name) {
                    out.reserved.push(name);
                }
            }
            match key.as_str() {
                "_where" => {
                    let mut terms = parse_where(value)?;
                    if let Some(first) = terms.first_mut() {
                        first.conjunction = Conjunction::And;
                    }
                    out.conditions.extend(terms);
                }
                "_sort" => {
                    for part in list(value) {
                        let (column, descending) = match part.strip_prefix('-') {
                            Some(c) => (c, true),
                            None => (part, false),
                        };
                        if column.is_empty() {
                            return Err(AppError::Validation("empty _sort column".into()));
                        }
                        out.sort.push(SortKey {
                            column: column.to_string(),
                            descending,
                        });
                    }
                }
                "_fields" => {
                    let fields: Vec<String> = list(value).map(str::to_string).collect();
                    if fields.is_empty() {
                        return Err(AppError::Validation("_fields is empty".into()));
                    }
                    out.fields.get_or_insert_with(Vec::new).extend(fields);
                }
                "_include" => out.includes.extend(list(value).map(str::to_string)),
                "_limit" => out.limit = Some(positive(key, value, 1)?),
                "_offset" => out.offset = Some(positive(key, value, 0)?),
                "_p" => out.page = Some(positive(key, value, 1)?),
                k if k.starts_with('_') => {
                    return Err(AppError::Validation(format!("unknown parameter '{}'", k)));
                }
                _ => out.equals.push((key.clone(), value.clone())),
            }
        }
        Ok(out)
    }

    /// `(limit, offset)` after defaults and the cap. `_p` wins over `_offset`.
    pub fn window(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = match self.page {
            Some(p) => (p - 1).saturating_mul(limit),
            None => self.offset.unwrap_or(0),
        };
        (limit, offset)
    }
}

fn list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn positive(key: &str, value: &str, min: i64) -> Result<i64, AppError> {
    match value.trim().parse::<i64>() {
        Ok(n) if n >= min => Ok(n),
        _ => Err(AppError::Validation(format!("{} must be an integer >= {}", key, min))),
    }
}

/// `(a,eq,1)~and(b,like,~x~)~or(c,in,1,2)`. A term ends at the first `)` followed by
/// `~` or the end of input, so values may contain parentheses and `~`.
pub fn parse_where(input: &str) -> Result<Vec<Condition>, AppError> {
    let malformed = || AppError::Validation(format!("malformed _where: {}", input));
    let mut rest = input.trim();
    let mut out = Vec::new();
    while !rest.is_empty() {
        let conjunction = if out.is_empty() {
            Conjunction::And
        } else if let Some(r) = rest.strip_prefix("~and") {
            rest = r;
            Conjunction::And
        } else if let Some(r) = rest.strip_prefix("~or") {
            rest = r;
            Conjunction::Or
        } else {
            return Err(malformed());
        };
        let body = rest.strip_prefix('(').ok_or_else(malformed)?;
        let close = term_end(body).ok_or_else(malformed)?;
        out.push(parse_term(&body[..close], conjunction)?);
        rest = &body[close + 1..];
    }
    if out.is_empty() {
        return Err(malformed());
    }
    Ok(out)
}

fn term_end(body: &str) -> Option<usize> {
    body.char_indices()
        .filter(|&(_, c)| c == ')')
        .map(|(i, _)| i)
        .find(|&i| matches!(body[i + 1..].chars().next(), None | Some('~')))
}

fn parse_term(term: &str, conjunction: Conjunction) -> Result<Condition, AppError> {
    let mut parts = term.splitn(3, ',');
    let column = parts.next().unwrap_or_default().trim();
    let op = parts.next().unwrap_or_default().trim();
    let value = parts.next().unwrap_or_default();
    if column.is_empty() || op.is_empty() {
        return Err(AppError::Validation(format!("malformed _where term: ({})", term)));
    }
    let op = FilterOp::parse(op, value.trim())?;
    let values = match op {
        FilterOp::IsNull | FilterOp::IsNotNull => Vec::new(),
        FilterOp::In => {
            let v: Vec<String> = value.split(',').map(str::to_string).collect();
            if v.iter().all(|s| s.is_empty()) {
                return Err(AppError::Validation(format!("{}: in needs at least one value", column)));
            }
            v
        }
        FilterOp::Between => {
            let v: Vec<String> = value.split(',').map(str::to_string).collect();
            if v.len() != 2 {
                return Err(AppError::Validation(format!("{}: btw needs exactly two values", column)));
            }
            v
        }
        FilterOp::Like | FilterOp::NotLike => vec![value.replace('~', "%")],
        _ => vec![value.to_string()],
    };
    Ok(Condition {
        conjunction,
        column: column.to_string(),
        op,
        values,
    })
}
