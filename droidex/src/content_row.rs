//! Best effort tokenizer for `content query` output.
//!
//! The output looks like
//!
//! ```text
//! Row: 0 _id=1, address=+15551234, body=hello, world, date=1700000000000
//! Row: 1 _id=2, address=NULL, body=second
//! line of the body, date=1700000000001
//! ```
//!
//! Values aren't escaped so this is inherently lossy: a value containing
//! `", "` followed by something without `=` is glued back onto the previous
//! field, one containing `", key="` is split in two. Anything before the
//! first row marker is ignored. It never fails, garbage just produces fewer
//! rows.

use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::utils::path_has_ext;

lazy_static! {
    static ref ROW_MARKER: Regex = Regex::new(r"^\s*Row:\s*(\d+)\s?(.*)$").expect("valid row regex");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRow {
    pub index: u64,
    pub fields: Vec<(String, String)>,
}

impl ContentRow {
    /// First value for `key`, `NULL` is returned as is
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn split_fields(body: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for piece in body.split(", ") {
        match piece.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => {
                fields.push((k.trim().to_string(), v.to_string()))
            }
            _ => {
                if let Some((_, last)) = fields.last_mut() {
                    last.push_str(", ");
                    last.push_str(piece);
                }
            }
        }
    }
    fields
}

/// Tokenize `content query` output into rows
pub fn parse_content_rows(text: &str) -> Vec<ContentRow> {
    let mut raw: Vec<(u64, String)> = Vec::new();

    for line in text.lines() {
        let marker = ROW_MARKER
            .captures(line)
            .and_then(|c| Some((c.get(1)?.as_str().parse::<u64>().ok()?, c.get(2)?.as_str())));

        match marker {
            Some((index, body)) => raw.push((index, body.to_string())),
            None => {
                if let Some((_, body)) = raw.last_mut() {
                    body.push('\n');
                    body.push_str(line);
                }
            }
        }
    }

    raw.into_iter()
        .map(|(index, body)| ContentRow {
            index,
            fields: split_fields(body.trim_end()),
        })
        .collect()
}

/// Tokenize every `.txt` file in `dir`, keyed by file stem and sorted by name
pub fn parse_content_query_dir(dir: &Path) -> crate::Result<Vec<(String, Vec<ContentRow>)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path_has_ext(&path, "txt") {
            files.push(path);
        }
    }
    files.sort();

    let mut out = Vec::with_capacity(files.len());
    for path in files {
        let bytes = fs::read(&path)?;
        let stem = path
            .file_stem()
            .map(|it| it.to_string_lossy().to_string())
            .unwrap_or_default();
        out.push((stem, parse_content_rows(&String::from_utf8_lossy(&bytes))));
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{tmp_context, TestContext, TreeEntry};
    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    #[rstest]
    fn test_basic_rows() {
        let text = "Row: 0 _id=1, address=+15551234, body=hello, world, date=1700000000000\n\
Row: 1 _id=2, address=NULL, body=second\n\
line of the body, date=1700000000001\n";
        let rows = parse_content_rows(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].get("body"), Some("hello, world"));
        assert_eq!(rows[0].get("date"), Some("1700000000000"));
        assert_eq!(rows[1].get("address"), Some("NULL"));
        assert_eq!(rows[1].get("body"), Some("second\nline of the body"));
        assert_eq!(rows[1].get("date"), Some("1700000000001"));
    }

    #[rstest]
    #[case("", 0)]
    #[case("No result found.\n", 0)]
    #[case("Error while accessing provider:sms\njava.lang.SecurityException: Permission Denial\n", 0)]
    #[case("Row: 0 \n", 1)]
    #[case("Row: 99999999999999999999999 a=b\nRow: 3 a=b\n", 1)]
    fn test_lenient(#[case] text: &str, #[case] expected: usize) {
        assert_eq!(parse_content_rows(text).len(), expected);
    }

    #[rstest]
    fn test_value_with_equals() {
        let rows = parse_content_rows("Row: 0 url=https://x.test/?a=b, title=t");
        assert_eq!(rows[0].get("url"), Some("https://x.test/?a=b"));
        assert_eq!(rows[0].get("title"), Some("t"));
    }

    #[rstest]
    fn test_never_panics_on_noise() {
        let mut rng = rand::thread_rng();
        let vocab = [
            "Row:", "Row: ", "Row: 1", "=", ", ", ",", "\n", "\r\n", " ", "key", "value", "NULL",
            "Row: 0 a=", "=,", "\u{fffd}", "ü", "\t", "Row:-1", "Row: 18446744073709551616",
        ];

        for _ in 0..500 {
            let n = rng.gen_range(0..64);
            let text: String = (0..n)
                .map(|_| *vocab.choose(&mut rng).expect("non-empty vocab"))
                .collect();
            let rows = parse_content_rows(&text);
            assert!(rows.len() <= text.matches("Row:").count());
        }

        for _ in 0..500 {
            let len = rng.gen_range(0..512);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let _ = parse_content_rows(&String::from_utf8_lossy(&bytes));
        }
    }

    #[rstest]
    fn test_parse_dir(tmp_context: TestContext) {
        tmp_context
            .create_tree(&[
                ("cq/sms.txt", TreeEntry::TxtFile("Row: 0 _id=1, body=hi\n")),
                ("cq/calls.txt", TreeEntry::TxtFile("No result found.\n")),
                ("cq/notes.md", TreeEntry::TxtFile("Row: 0 a=b\n")),
            ])
            .expect("tree");
        let parsed = parse_content_query_dir(&tmp_context.to_abs("cq")).expect("parse dir");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "calls");
        assert!(parsed[0].1.is_empty());
        assert_eq!(parsed[1].0, "sms");
        assert_eq!(parsed[1].1[0].get("body"), Some("hi"));
    }
}
