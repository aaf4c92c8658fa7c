//! The query-string surface language
//!
//! Tokens, in recognition order: quoted field terms (`tag:"deep work"`),
//! field terms with optional `..` ranges (`date:2024-01-01..2024-02-01`),
//! quoted phrases, plain words. A leading `-` negates a field term.
//! Unrecognized bytes are skipped; tokenization never fails.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use super::SearchQuery;
use crate::error::Result;

static QUOTED_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(-?)(\w+):"([^"]*)""#).expect("quoted field regex"));
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?)(\w+):([^:\s]+(?:\.\.[^:\s]+)?)").expect("field regex")
});
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"([^"]*)""#).expect("quoted regex"));
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\S+").expect("word regex"));
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?:\s+\d{2}:\d{2}:\d{2})?$").expect("date regex")
});

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// `field:value`, possibly negated
    Field {
        negated: bool,
        field: String,
        value: String,
    },
    /// `field:start..end`
    Range {
        field: String,
        start: String,
        end: String,
    },
    /// Quoted phrase or plain word destined for the text query
    Text(String),
}

/// Parser for the query-string surface language
pub struct QueryParser;

impl QueryParser {
    /// Parse a query string into a structured query
    ///
    /// Unrecognized tokens drop silently; an error is reserved for
    /// catastrophic failure.
    pub fn parse(query_str: &str) -> Result<SearchQuery> {
        if query_str.trim().is_empty() {
            return Ok(SearchQuery::new());
        }

        let tokens = tokenize(query_str);
        Ok(build_query(&tokens))
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        rest = trimmed;

        if let Some(caps) = QUOTED_FIELD_RE.captures(rest) {
            tokens.push(Token::Field {
                negated: !caps[1].is_empty(),
                field: caps[2].to_string(),
                value: caps[3].to_string(),
            });
            rest = &rest[caps[0].len()..];
            continue;
        }

        if let Some(caps) = FIELD_RE.captures(rest) {
            let value = &caps[3];
            if let Some((start, end)) = value.split_once("..") {
                tokens.push(Token::Range {
                    field: caps[2].to_string(),
                    start: start.to_string(),
                    end: end.to_string(),
                });
            } else {
                tokens.push(Token::Field {
                    negated: !caps[1].is_empty(),
                    field: caps[2].to_string(),
                    value: value.to_string(),
                });
            }
            rest = &rest[caps[0].len()..];
            continue;
        }

        if let Some(caps) = QUOTED_RE.captures(rest) {
            tokens.push(Token::Text(caps[1].to_string()));
            rest = &rest[caps[0].len()..];
            continue;
        }

        if let Some(m) = WORD_RE.find(rest) {
            tokens.push(Token::Text(m.as_str().to_string()));
            rest = &rest[m.end()..];
            continue;
        }

        // Unmatched byte; skip it
        let mut chars = rest.chars();
        chars.next();
        rest = chars.as_str();
    }

    tokens
}

fn build_query(tokens: &[Token]) -> SearchQuery {
    let mut query = SearchQuery::new();
    let mut text_parts: Vec<String> = Vec::new();
    let mut exclude_tags: Vec<String> = Vec::new();

    for token in tokens {
        match token {
            Token::Text(value) => text_parts.push(value.clone()),

            Token::Field {
                negated,
                field,
                value,
            } => match field.as_str() {
                "tag" => {
                    if *negated {
                        exclude_tags.push(value.clone());
                    } else {
                        query.tags.push(value.clone());
                    }
                }
                "notebook" => {
                    if !*negated && query.notebook.is_none() {
                        query.notebook = Some(value.clone());
                    }
                }
                "title" => {
                    if !*negated {
                        text_parts.push(format!("title:\"{}\"", value));
                    }
                }
                "content" => {
                    if !*negated {
                        text_parts.push(value.clone());
                    }
                }
                "since" | "after" => {
                    if !*negated {
                        if let Some(date) = parse_date(value) {
                            query.since = Some(date);
                        }
                    }
                }
                "until" | "before" => {
                    if !*negated {
                        if let Some(date) = parse_date(value) {
                            query.until = Some(date);
                        }
                    }
                }
                // Unknown field terms drop
                _ => {}
            },

            Token::Range { field, start, end } => {
                if matches!(field.as_str(), "date" | "created" | "modified") {
                    if let (Some(since), Some(until)) = (parse_date(start), parse_date(end)) {
                        query.since = Some(since);
                        query.until = Some(until);
                    }
                }
            }
        }
    }

    query.text = text_parts.join(" ");

    for tag in &exclude_tags {
        if !query.text.is_empty() {
            query.text.push(' ');
        }
        query.text.push_str(&format!("-tags:\"{}\"", tag));
    }

    query
}

/// Parse `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`; anything else is `None`
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if !DATE_RE.is_match(s) {
        return None;
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_utc_datetime(&dt).into();
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}
