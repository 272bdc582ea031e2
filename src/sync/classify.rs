//! # Statement Classification
//!
//! Decides whether an SQL statement can change persistent state and
//! therefore warrants scheduling a flush. The check is deliberately
//! coarse: it looks at the first real token after leading whitespace and
//! comments, so a false positive (scheduling a flush that finds nothing
//! dirty) is harmless, while a false negative would strand data.
//!
//! `PRAGMA` is in the mutating set because pragmas like `user_version`
//! write to the database header.

/// First keywords of statements that can modify persistent state.
const MUTATING_KEYWORDS: &[&[u8]] = &[
    b"alter", b"create", b"delete", b"drop", b"insert", b"pragma", b"reindex",
    b"replace", b"truncate", b"update", b"vacuum",
];

/// True when the statement's first token is a data- or schema-modifying
/// keyword. Leading whitespace, `--` line comments and `/* */` block
/// comments are skipped; the comparison is case-insensitive.
pub fn is_mutation(sql: &str) -> bool {
    let rest = skip_trivia(sql.as_bytes());
    let end = rest
        .iter()
        .position(|b| !b.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let token = &rest[..end];
    MUTATING_KEYWORDS
        .iter()
        .any(|kw| token.eq_ignore_ascii_case(kw))
}

fn skip_trivia(mut s: &[u8]) -> &[u8] {
    loop {
        while !s.is_empty() && s[0].is_ascii_whitespace() {
            s = &s[1..];
        }
        if s.starts_with(b"--") {
            match s.iter().position(|&b| b == b'\n') {
                Some(i) => s = &s[i + 1..],
                None => return &[],
            }
        } else if s.starts_with(b"/*") {
            match s[2..].windows(2).position(|w| w == b"*/") {
                Some(i) => s = &s[i + 4..],
                None => return &[],
            }
        } else {
            return s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mutations_are_recognized() {
        assert!(is_mutation("INSERT INTO t VALUES (1)"));
        assert!(is_mutation("update t set x = 1"));
        assert!(is_mutation("Delete From t"));
        assert!(is_mutation("CREATE TABLE t (x)"));
        assert!(is_mutation("drop table t"));
        assert!(is_mutation("VACUUM"));
        assert!(is_mutation("PRAGMA user_version = 3"));
    }

    #[test]
    fn reads_are_not_mutations() {
        assert!(!is_mutation("SELECT * FROM t"));
        assert!(!is_mutation("explain query plan select 1"));
        assert!(!is_mutation("BEGIN"));
        assert!(!is_mutation(""));
    }

    #[test]
    fn leading_whitespace_is_skipped() {
        assert!(is_mutation("   \n\t  insert into t values (1)"));
        assert!(!is_mutation("   \n  select 1"));
    }

    #[test]
    fn line_comments_are_skipped() {
        assert!(is_mutation("-- touch the table\nINSERT INTO t VALUES (1)"));
        assert!(!is_mutation("-- insert is only mentioned here\nSELECT 1"));
        assert!(!is_mutation("-- a dangling comment with no statement"));
    }

    #[test]
    fn block_comments_are_skipped() {
        assert!(is_mutation("/* setup */ CREATE TABLE t (x)"));
        assert!(is_mutation("/* multi\n   line */\nupdate t set x = 1"));
        assert!(!is_mutation("/* unterminated insert"));
    }

    #[test]
    fn stacked_trivia_is_skipped() {
        assert!(is_mutation(
            "  /* a */ -- b\n  /* c */\n  REPLACE INTO t VALUES (1)"
        ));
    }

    #[test]
    fn keyword_must_be_a_whole_token() {
        assert!(!is_mutation("inserting_function()"));
        assert!(!is_mutation("updates"));
    }
}
