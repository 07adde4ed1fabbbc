use crate::query::{BuiltQuery, QueryArg, QueryBuilder};
use crate::{Error, Result};

/// Where a query looks when it does not say otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Inbox,
    Archive,
    Anywhere,
}

/// A small conjunctive query language.
///
/// Supported terms: `repo:owner/name`, `org:owner`, `reason:x`, `type:x`,
/// `is:read|unread|starred|muted|archived|filtered`,
/// `in:inbox|archive|anywhere`, and bare words matched against the subject
/// title. Terms are separated by whitespace or `AND`; parentheses are ignored.
/// Without an `in:` term, results are limited to the inbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermQueryBuilder;

impl TermQueryBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl QueryBuilder for TermQueryBuilder {
    fn build_query(&self, query: &str, page_size: i64, offset: i64) -> Result<BuiltQuery> {
        let mut built = BuiltQuery::new(page_size, offset);
        let mut scope = None;

        let normalized = query.replace(['(', ')'], " ");
        for token in normalized.split_whitespace() {
            if token == "AND" {
                continue;
            }
            if token == "OR" || token == "NOT" || token.starts_with('-') {
                return Err(Error::query(format!("unsupported operator '{}'", token)));
            }

            match token.split_once(':') {
                Some(("in", value)) => {
                    let requested = match value {
                        "inbox" => Scope::Inbox,
                        "archive" => Scope::Archive,
                        "anywhere" => Scope::Anywhere,
                        other => return Err(Error::query(format!("unknown scope 'in:{}'", other))),
                    };
                    // `in:anywhere` widens whatever else was asked for.
                    scope = match (scope, requested) {
                        (Some(Scope::Anywhere), _) | (_, Scope::Anywhere) => Some(Scope::Anywhere),
                        (_, s) => Some(s),
                    };
                }
                Some((key, value)) if !value.is_empty() => push_term(&mut built, key, value)?,
                _ => built.push(
                    "n.subject_title LIKE ?",
                    [QueryArg::Text(format!("%{}%", token))],
                ),
            }
        }

        match scope.unwrap_or(Scope::Inbox) {
            Scope::Inbox => built.push_clause("n.archived = 0 AND n.muted = 0 AND n.filtered = 0"),
            Scope::Archive => built.push_clause("n.archived = 1"),
            Scope::Anywhere => {}
        }

        Ok(built)
    }
}

fn push_term(built: &mut BuiltQuery, key: &str, value: &str) -> Result<()> {
    let text = || [QueryArg::Text(value.to_string())];
    match key {
        "repo" => built.push("LOWER(n.repository_full_name) = LOWER(?)", text()),
        "org" => built.push("LOWER(n.repository_owner) = LOWER(?)", text()),
        "reason" => built.push("n.reason = ?", text()),
        "type" => built.push("LOWER(n.subject_type) = LOWER(?)", text()),
        "is" => {
            let (clause, flag) = match value {
                "read" => ("n.is_read = ?", true),
                "unread" => ("n.is_read = ?", false),
                "starred" => ("n.starred = ?", true),
                "muted" => ("n.muted = ?", true),
                "archived" => ("n.archived = ?", true),
                "filtered" => ("n.filtered = ?", true),
                other => return Err(Error::query(format!("unknown filter 'is:{}'", other))),
            };
            built.push(clause, [QueryArg::Bool(flag)]);
        }
        other => return Err(Error::query(format!("unknown field '{}'", other))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(query: &str) -> Result<BuiltQuery> {
        TermQueryBuilder::new().build_query(query, 100, 0)
    }

    #[test]
    fn test_default_scope_is_inbox() {
        let built = build("repo:octo/hello").unwrap();
        assert_eq!(
            built.where_clauses,
            vec![
                "LOWER(n.repository_full_name) = LOWER(?)",
                "n.archived = 0 AND n.muted = 0 AND n.filtered = 0",
            ]
        );
        assert_eq!(built.args, vec![QueryArg::Text("octo/hello".into())]);
        assert_eq!((built.limit, built.offset), (100, 0));
    }

    #[test]
    fn test_anywhere_overrides_inbox_scope() {
        let built = build("(in:inbox reason:mention) AND in:anywhere").unwrap();
        assert_eq!(built.where_clauses, vec!["n.reason = ?"]);
    }

    #[test]
    fn test_flags_and_free_text() {
        let built = build("is:unread flaky").unwrap();
        assert_eq!(built.where_clauses[0], "n.is_read = ?");
        assert_eq!(built.where_clauses[1], "n.subject_title LIKE ?");
        assert_eq!(
            built.args,
            vec![QueryArg::Bool(false), QueryArg::Text("%flaky%".into())]
        );
    }

    #[test]
    fn test_rejects_unsupported_syntax() {
        assert!(matches!(build("a OR b"), Err(Error::Query(_))));
        assert!(matches!(build("-is:read"), Err(Error::Query(_))));
        assert!(matches!(build("is:sleepy"), Err(Error::Query(_))));
        assert!(matches!(build("label:bug"), Err(Error::Query(_))));
    }
}
