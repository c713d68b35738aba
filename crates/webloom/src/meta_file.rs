use crate::error::{IoContext, Result, WebloomError};
use serde_json::{Map, Value};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

pub type MetaMap = Map<String, Value>;

pub struct MetaFile<'a> {
    path: PathBuf,
    text: &'a str,
    blocks: Vec<Range<usize>>,
    meta_end: Option<usize>,
}

impl<'a> MetaFile<'a> {
    pub fn new(path: impl AsRef<Path>, text: &'a str) -> Self {
        let (blocks, meta_end) = scan_blocks(text);
        Self {
            path: path.as_ref().to_path_buf(),
            text,
            blocks,
            meta_end,
        }
    }

    pub fn meta_end(&self) -> Option<usize> {
        self.meta_end
    }

    pub fn has_meta_data(&self) -> bool {
        self.meta_end.is_some()
    }

    pub fn meta_data(&self) -> Result<Option<MetaMap>> {
        match self.blocks.first() {
            Some(range) => self.parse_block(range.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Every stacked block, each one layered over the keys of the first.
    pub fn each_meta_block(&self) -> Result<Vec<MetaMap>> {
        let mut merged = Vec::with_capacity(self.blocks.len());
        let mut first: Option<MetaMap> = None;

        for range in &self.blocks {
            let block = self.parse_block(range.clone())?;
            match &first {
                None => {
                    first = Some(block.clone());
                    merged.push(block);
                }
                Some(defaults) => {
                    let mut combined = defaults.clone();
                    combined.extend(block);
                    merged.push(combined);
                }
            }
        }

        Ok(merged)
    }

    pub fn read(&self) -> &'a str {
        &self.text[self.meta_end.unwrap_or(0)..]
    }

    fn parse_block(&self, range: Range<usize>) -> Result<MetaMap> {
        let raw = &self.text[range];
        let parse_error = |message: String| WebloomError::MetadataParse {
            path: self.path.clone(),
            block: raw.to_string(),
            message,
        };

        if raw.trim().is_empty() {
            return Ok(MetaMap::new());
        }

        let value: Value =
            serde_yml::from_str(raw).map_err(|error| parse_error(error.to_string()))?;

        match value {
            Value::Null => Ok(MetaMap::new()),
            Value::Object(map) => Ok(map),
            other => Err(parse_error(format!(
                "expected a mapping of keys to values, found {}",
                describe(&other)
            ))),
        }
    }
}

pub fn read_body(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path).io_context("reading", path)?;
    let file = MetaFile::new(path, &text);
    Ok(file.read().to_string())
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

fn is_separator(line: &str) -> bool {
    line.strip_prefix("---")
        .is_some_and(|rest| rest.chars().all(char::is_whitespace))
}

// A stacked block must read as a mapping; anything else is body text
// between horizontal rules.
fn is_stackable(raw: &str) -> bool {
    raw.trim().is_empty()
        || matches!(
            serde_yml::from_str::<Value>(raw),
            Ok(Value::Object(_) | Value::Null)
        )
}

fn scan_blocks(text: &str) -> (Vec<Range<usize>>, Option<usize>) {
    let mut blocks = Vec::new();
    let mut meta_end = None;
    let mut lines = text.split_inclusive('\n').peekable();
    let mut position = 0;

    match lines.peek() {
        Some(line) if is_separator(line) => {}
        _ => return (blocks, meta_end),
    }

    while let Some(opener) = lines.next_if(|line| is_separator(line)) {
        let start = position + opener.len();
        let mut cursor = start;
        let mut closed = None;

        for line in lines.by_ref() {
            if is_separator(line) {
                closed = Some((cursor, cursor + line.len()));
                break;
            }
            cursor += line.len();
        }

        let Some((end, after)) = closed else {
            break;
        };
        if !blocks.is_empty() && !is_stackable(&text[start..end]) {
            break;
        }

        blocks.push(start..end);
        meta_end = Some(after);
        position = after;
    }

    (blocks, meta_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(text: &str) -> MetaFile<'_> {
        MetaFile::new("test.txt", text)
    }

    #[test]
    fn test_plain_file_has_no_metadata() {
        let file = meta("body { color: red; }\n");
        assert_eq!(file.meta_end(), None);
        assert!(file.meta_data().unwrap().is_none());
        assert_eq!(file.read(), "body { color: red; }\n");
    }

    #[test]
    fn test_single_block() {
        let text = "---\nextension: html\nfilter: erb\n---\nHello\n";
        let file = meta(text);
        assert_eq!(file.meta_end(), Some(text.find("Hello").unwrap()));
        let data = file.meta_data().unwrap().unwrap();
        assert_eq!(data.get("extension"), Some(&json!("html")));
        assert_eq!(data.get("filter"), Some(&json!("erb")));
        assert_eq!(file.read(), "Hello\n");
    }

    #[test]
    fn test_separator_with_trailing_whitespace_and_crlf() {
        let text = "---  \r\ntitle: Windows\r\n---\r\nbody";
        let file = meta(text);
        assert_eq!(file.read(), "body");
        let data = file.meta_data().unwrap().unwrap();
        assert_eq!(data.get("title"), Some(&json!("Windows")));
    }

    #[test]
    fn test_longer_rule_is_not_a_separator() {
        let file = meta("----\ntitle: x\n----\nbody");
        assert_eq!(file.meta_end(), None);
    }

    #[test]
    fn test_unterminated_block_is_content() {
        let text = "---\ntitle: never closed\nbody\n";
        let file = meta(text);
        assert_eq!(file.meta_end(), None);
        assert!(file.meta_data().unwrap().is_none());
        assert_eq!(file.read(), text);
    }

    #[test]
    fn test_empty_block_is_empty_mapping() {
        let file = meta("---\n---\nbody");
        assert_eq!(file.meta_data().unwrap(), Some(MetaMap::new()));
        assert_eq!(file.read(), "body");
    }

    #[test]
    fn test_stacked_blocks_inherit_first() {
        let text = "---\nlayout: post\nauthor: me\n---\n---\ntitle: Two\n---\nshared body\n";
        let file = meta(text);
        let blocks = file.each_meta_block().unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].get("layout"), Some(&json!("post")));
        assert_eq!(blocks[0].get("author"), Some(&json!("me")));
        assert!(blocks[0].get("title").is_none());

        assert_eq!(blocks[1].get("layout"), Some(&json!("post")));
        assert_eq!(blocks[1].get("author"), Some(&json!("me")));
        assert_eq!(blocks[1].get("title"), Some(&json!("Two")));

        assert_eq!(file.read(), "shared body\n");
    }

    #[test]
    fn test_stacked_block_overrides_first() {
        let text = "---\nlayout: post\n---\n---\nlayout: wide\n---\n";
        let blocks = meta(text).each_meta_block().unwrap();
        assert_eq!(blocks[1].get("layout"), Some(&json!("wide")));
    }

    #[test]
    fn test_unterminated_trailing_block_stays_in_body() {
        let text = "---\ntitle: One\n---\n---\ndangling\n";
        let file = meta(text);
        assert_eq!(file.each_meta_block().unwrap().len(), 1);
        assert_eq!(file.read(), "---\ndangling\n");
    }

    #[test]
    fn test_horizontal_rules_after_metadata_stay_in_body() {
        let text = "---\nlayout: ~\ntitle: x\n---\n---\nIntro paragraph\n---\nmore\n";
        let file = meta(text);

        let blocks = file.each_meta_block().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].get("title"), Some(&json!("x")));
        assert_eq!(file.read(), "---\nIntro paragraph\n---\nmore\n");
    }

    #[test]
    fn test_malformed_block_reports_raw_text() {
        let text = "---\ntitle: [unclosed\n---\nbody";
        let error = meta(text).meta_data().unwrap_err();
        match error {
            WebloomError::MetadataParse { block, path, .. } => {
                assert_eq!(block, "title: [unclosed\n");
                assert_eq!(path, PathBuf::from("test.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scalar_block_is_rejected() {
        let error = meta("---\njust a string\n---\n").meta_data().unwrap_err();
        assert!(matches!(error, WebloomError::MetadataParse { .. }));
    }
}
