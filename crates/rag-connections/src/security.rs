//! SQL statement classification.
//!
//! Comment/string stripping needs the same "ignore what's inside literals
//! and comments" pass that any query-checking tool applies before
//! inspecting keywords.

/// The access class of a SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementClass {
    Read,
    Write,
    Administrative,
}

/// Strip string literals and comments, replacing their contents with spaces
/// so keyword matching only sees real SQL tokens and positions are preserved.
pub(crate) fn strip_sql_comments_and_strings(query: &str) -> String {
    let bytes = query.as_bytes();
    let mut out = String::with_capacity(query.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                out.push(' ');
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        out.push(' ');
                        if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                            out.push(' ');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    out.push(' ');
                    i += 1;
                }
            }
            b'-' if i + 1 < bytes.len() && bytes[i + 1] == b'-' => {
                out.push(' ');
                out.push(' ');
                i += 2;
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                out.push(' ');
                out.push(' ');
                i += 2;
                while i + 1 < bytes.len() {
                    if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                        out.push(' ');
                        out.push(' ');
                        i += 2;
                        break;
                    }
                    out.push(' ');
                    i += 1;
                }
            }
            b => {
                out.push(b as char);
                i += 1;
            }
        }
    }
    out
}

const WRITE_KEYWORDS: [&str; 6] = ["INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "REPLACE"];
const ADMIN_KEYWORDS: [&str; 8] = [
    "DROP", "ALTER", "TRUNCATE", "GRANT", "REVOKE", "CREATE", "VACUUM", "RENAME",
];

/// Classify a statement's leading keyword (after comments/strings are
/// stripped) as read, write, or administrative.
pub fn classify(statement: &str) -> StatementClass {
    let cleaned = strip_sql_comments_and_strings(statement);
    let upper = cleaned.trim_start().to_uppercase();
    if ADMIN_KEYWORDS.iter().any(|k| upper.starts_with(k)) {
        return StatementClass::Administrative;
    }
    if WRITE_KEYWORDS.iter().any(|k| upper.starts_with(k)) {
        return StatementClass::Write;
    }
    StatementClass::Read
}

/// Reject a statement whose class is not in `permitted`.
pub fn validate(statement: &str, permitted: &[StatementClass]) -> Result<(), ragcore::Error> {
    let class = classify(statement);
    if permitted.contains(&class) {
        Ok(())
    } else {
        Err(ragcore::Error::Validation(format!(
            "statement classified as {class:?} is not in the permitted set {permitted:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_select_as_read() {
        assert_eq!(classify("SELECT * FROM orders"), StatementClass::Read);
    }

    #[test]
    fn classifies_insert_as_write() {
        assert_eq!(
            classify("INSERT INTO orders (id) VALUES (1)"),
            StatementClass::Write
        );
    }

    #[test]
    fn classifies_drop_as_administrative() {
        assert_eq!(classify("DROP TABLE orders"), StatementClass::Administrative);
    }

    #[test]
    fn ignores_keywords_hidden_in_string_literals() {
        // A literal containing "DROP TABLE" must not flip a SELECT to administrative.
        assert_eq!(
            classify("SELECT * FROM orders WHERE note = 'DROP TABLE everything'"),
            StatementClass::Read
        );
    }

    #[test]
    fn ignores_keywords_hidden_in_comments() {
        assert_eq!(
            classify("SELECT * FROM orders -- DROP TABLE orders\n"),
            StatementClass::Read
        );
    }

    #[test]
    fn validate_rejects_statements_outside_permitted_set() {
        let err = validate("DELETE FROM orders", &[StatementClass::Read]).unwrap_err();
        assert!(matches!(err, ragcore::Error::Validation(_)));
    }
}
