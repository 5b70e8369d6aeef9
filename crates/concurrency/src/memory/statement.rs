//! Statement forms understood by the in-memory server

use proctor_core::{ProctorError, ProctorResult, Row, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub(super) enum Write {
    Create(String),
    Insert(String, Row),
    Delete(String),
}

impl Write {
    pub(super) fn apply(&self, tables: &mut BTreeMap<String, Vec<Row>>) -> usize {
        match self {
            Write::Create(table) => {
                tables.entry(table.clone()).or_default();
                0
            }
            Write::Insert(table, row) => {
                tables.entry(table.clone()).or_default().push(row.clone());
                1
            }
            Write::Delete(table) => tables
                .get_mut(table)
                .map(|rows| std::mem::take(rows).len())
                .unwrap_or(0),
        }
    }
}

#[derive(Debug)]
pub(super) enum Statement {
    Write(Write),
    SelectAll(String),
    Count(String),
}

pub(super) fn parse_statement(query: &str, params: &[Value]) -> ProctorResult<Statement> {
    let words: Vec<&str> = query.split_whitespace().collect();
    let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
    let upper: Vec<&str> = upper.iter().map(String::as_str).collect();
    let table = |idx: usize| -> ProctorResult<String> {
        words
            .get(idx)
            .map(|t| t.trim_end_matches(';').to_string())
            .ok_or_else(|| ProctorError::database(format!("syntax error in \"{}\"", query)))
    };
    match upper.as_slice() {
        ["CREATE", "TABLE", ..] => Ok(Statement::Write(Write::Create(table(2)?))),
        ["INSERT", "INTO", ..] => Ok(Statement::Write(Write::Insert(table(2)?, params.to_vec()))),
        ["DELETE", "FROM", ..] => Ok(Statement::Write(Write::Delete(table(2)?))),
        ["SELECT", "*", "FROM", ..] => Ok(Statement::SelectAll(table(3)?)),
        ["SELECT", "COUNT(*)", "FROM", ..] => Ok(Statement::Count(table(3)?)),
        _ => Err(ProctorError::database(format!(
            "unsupported statement \"{}\"",
            query
        ))),
    }
}
