//! DDL statement classification
//!
//! Narrow parser for the statements produced by the model compiler: it only
//! needs to tell tables from views and recover the created object's name.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};

/// What a classified statement creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Table,
    View,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Table => f.write_str("table"),
            StatementKind::View => f.write_str("view"),
        }
    }
}

/// A table- or view-creating statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlStatement {
    pub kind: StatementKind,
    pub schema: Option<String>,
    pub name: String,
    /// The name was written as a quoted identifier
    pub quoted: bool,
}

impl DdlStatement {
    /// Identifier as it must be written to address the object again
    pub fn sql_name(&self) -> String {
        if self.quoted {
            format!("\"{}\"", self.name.replace('"', "\"\""))
        } else {
            self.name.clone()
        }
    }

    pub fn is_view(&self) -> bool {
        self.kind == StatementKind::View
    }
}

static CREATE_STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?(?:(?:GLOBAL\s+|LOCAL\s+)?(?:TEMPORARY|TEMP)\s+|UNLOGGED\s+|MATERIALIZED\s+)?(TABLE|VIEW)\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:("(?:[^"]|"")+"|[A-Za-z_][\w$]*)\s*\.\s*)?("(?:[^"]|"")+"|[A-Za-z_][\w$]*)"#,
    )
    .expect("valid statement pattern")
});

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""((?:[^"]|"")+)"|([A-Za-z_][\w$]*)|([.,()])"#).expect("valid token pattern")
});

/// Words that end a relation list or cannot be an alias
const CLAUSE_KEYWORDS: &[&str] = &[
    "as", "cross", "except", "fetch", "for", "from", "full", "group", "having", "inner", "intersect", "join",
    "lateral", "left", "limit", "natural", "offset", "on", "order", "outer", "returning", "right", "select",
    "union", "using", "values", "where", "window", "with",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident { name: String, quoted: bool },
    Punct(char),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident { name, quoted: false } if name.eq_ignore_ascii_case(keyword))
    }

    fn is_clause_keyword(&self) -> bool {
        CLAUSE_KEYWORDS.iter().any(|keyword| self.is_keyword(keyword))
    }
}

fn tokenize(code: &str) -> Vec<Token> {
    TOKEN
        .captures_iter(code)
        .filter_map(|captures| match (captures.get(1), captures.get(2), captures.get(3)) {
            (Some(quoted), _, _) => Some(Token::Ident {
                name: quoted.as_str().replace("\"\"", "\""),
                quoted: true,
            }),
            (None, Some(bare), _) => Some(Token::Ident {
                name: bare.as_str().to_string(),
                quoted: false,
            }),
            (None, None, Some(punct)) => punct.as_str().chars().next().map(Token::Punct),
            _ => None,
        })
        .collect()
}

fn unquote(identifier: &str) -> (String, bool) {
    match identifier.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        Some(inner) => (inner.replace("\"\"", "\""), true),
        None => (identifier.to_string(), false),
    }
}

/// Classify one statement as table- or view-creating
pub fn classify(statement: &str) -> Result<DdlStatement> {
    let captures = CREATE_STATEMENT
        .captures(statement)
        .ok_or_else(|| Error::UnclassifiedStatement(summarize(statement)))?;

    let kind = if captures[1].eq_ignore_ascii_case("view") {
        StatementKind::View
    } else {
        StatementKind::Table
    };
    let schema = captures.get(2).map(|m| unquote(m.as_str()).0);
    let (name, quoted) = unquote(&captures[3]);

    Ok(DdlStatement { kind, schema, name, quoted })
}

/// Classify every statement that creates a table or view, skipping the rest
pub fn classify_all<'a>(statements: impl IntoIterator<Item = &'a String>) -> Vec<DdlStatement> {
    statements
        .into_iter()
        .filter_map(|statement| match classify(statement) {
            Ok(ddl) => Some(ddl),
            Err(e) => {
                tracing::trace!(error = %e, "Skipping statement");
                None
            }
        })
        .collect()
}

/// Fail on any statement that creates its object in an explicit schema
///
/// Model statements are deployed into whichever schema the run targets, so a
/// qualifier would send them elsewhere.
pub fn ensure_unqualified(statements: &[String]) -> Result<()> {
    for statement in statements {
        if let Ok(DdlStatement { schema: Some(schema), name, .. }) = classify(statement) {
            return Err(Error::ModelCompilation(format!(
                "`{}` creates {}.{}; model statements must not name a schema",
                summarize(statement),
                schema,
                name
            )));
        }
    }
    Ok(())
}

/// Lower-cased names of the relations `sql` selects from
///
/// Only names in table position count: after `FROM` or `JOIN` and in the
/// comma-separated list that follows `FROM`. Column names, aliases, string
/// literals and comments are ignored. A qualified name contributes its last
/// segment and its `schema.name` form.
pub fn relation_names(sql: &str) -> HashSet<String> {
    let tokens = tokenize(&strip_literals(sql));
    let mut names = HashSet::new();
    let mut expecting = false;
    let mut index = 0;

    while index < tokens.len() {
        let token = &tokens[index];
        if token.is_keyword("from") || token.is_keyword("join") {
            expecting = true;
            index += 1;
            continue;
        }
        if expecting && (token.is_keyword("lateral") || token.is_keyword("only")) {
            index += 1;
            continue;
        }

        let Token::Ident { name, .. } = token else {
            expecting = false;
            index += 1;
            continue;
        };
        if !expecting {
            index += 1;
            continue;
        }

        let mut segments = vec![name.to_lowercase()];
        index += 1;
        while let (Some(Token::Punct('.')), Some(Token::Ident { name, .. })) = (tokens.get(index), tokens.get(index + 1)) {
            segments.push(name.to_lowercase());
            index += 2;
        }
        if let [.., schema, relation] = segments.as_slice() {
            names.insert(format!("{}.{}", schema, relation));
        }
        if let Some(relation) = segments.pop() {
            names.insert(relation);
        }

        // Optional alias
        match tokens.get(index) {
            Some(token) if token.is_keyword("as") => {
                index += 1;
                if matches!(tokens.get(index), Some(Token::Ident { .. })) {
                    index += 1;
                }
            }
            Some(token @ Token::Ident { .. }) if !token.is_clause_keyword() => index += 1,
            _ => {}
        }

        expecting = tokens.get(index) == Some(&Token::Punct(','));
        if expecting {
            index += 1;
        }
    }

    names
}

/// Replace string literals and comments with spaces, keeping quoted identifiers
fn strip_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                while let Some(n) = chars.next() {
                    if n == '\'' {
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                out.push(' ');
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                out.push('\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut last = '\0';
                for n in chars.by_ref() {
                    if last == '*' && n == '/' {
                        break;
                    }
                    last = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

fn summarize(statement: &str) -> String {
    let flat: String = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 60 {
        format!("{}...", flat.chars().take(60).collect::<String>())
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("CREATE TABLE books (id INTEGER)", StatementKind::Table, None, "books", false)]
    #[case("create view books_view as select * from books", StatementKind::View, None, "books_view", false)]
    #[case("CREATE OR REPLACE VIEW \"Books_View\" AS SELECT 1", StatementKind::View, None, "Books_View", true)]
    #[case("  CREATE TABLE IF NOT EXISTS shop.orders (id INT)", StatementKind::Table, Some("shop"), "orders", false)]
    #[case("CREATE MATERIALIZED VIEW stats AS SELECT 1", StatementKind::View, None, "stats", false)]
    #[case("\nCREATE\n  TABLE\n  \"my\".\"Table\" (x int)", StatementKind::Table, Some("my"), "Table", true)]
    fn test_classify(
        #[case] sql: &str,
        #[case] kind: StatementKind,
        #[case] schema: Option<&str>,
        #[case] name: &str,
        #[case] quoted: bool,
    ) {
        let ddl = classify(sql).unwrap();
        assert_eq!(ddl.kind, kind);
        assert_eq!(ddl.schema.as_deref(), schema);
        assert_eq!(ddl.name, name);
        assert_eq!(ddl.quoted, quoted);
    }

    #[rstest]
    #[case("CREATE INDEX ix_books ON books (title)")]
    #[case("COMMENT ON TABLE books IS 'x'")]
    #[case("ALTER TABLE books ADD COLUMN x INT")]
    fn test_classify_rejects_other_statements(#[case] sql: &str) {
        assert!(matches!(classify(sql), Err(Error::UnclassifiedStatement(_))));
    }

    #[test]
    fn test_sql_name_keeps_quoting() {
        assert_eq!(classify("CREATE VIEW \"A\"\"b\" AS SELECT 1").unwrap().sql_name(), "\"A\"\"b\"");
        assert_eq!(classify("CREATE VIEW ab AS SELECT 1").unwrap().sql_name(), "ab");
    }

    #[test]
    fn test_qualified_statements_are_rejected() {
        let statements = vec![
            "CREATE TABLE t (id INT)".to_string(),
            "CREATE INDEX ix ON public.t (id)".to_string(),
        ];
        ensure_unqualified(&statements).unwrap();

        let statements = vec!["CREATE TABLE public.t (id INT)".to_string()];
        let err = ensure_unqualified(&statements).unwrap_err();
        assert!(matches!(err, Error::ModelCompilation(_)));
        assert!(err.to_string().contains("public.t"), "{}", err);
    }

    #[test]
    fn test_relation_names_skip_columns_literals_and_comments() {
        let names = relation_names(
            "SELECT a.id, orders_view FROM shop.Books a -- joins authors_view\n JOIN \"Authors\" b ON b.x = 'top_view'",
        );
        assert!(names.contains("books"));
        assert!(names.contains("shop.books"));
        assert!(names.contains("authors"));
        assert!(!names.contains("authors_view"));
        assert!(!names.contains("orders_view"));
        assert!(!names.contains("top_view"));
        assert!(!names.contains("a"));
        assert!(!names.contains("id"));
    }

    #[test]
    fn test_relation_names_follow_lists_and_subqueries() {
        let names = relation_names("SELECT * FROM a x, b AS y WHERE x.id IN (SELECT id FROM c) ORDER BY y.n");
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
