//! Frontmatter extraction and typed field access.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_yaml::Value;

/// Line that opens and closes a frontmatter block.
pub const DELIMITER: &[u8] = b"---";

/// Textual format of date fields.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single frontmatter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Bool(bool),
    Date(NaiveDate),
    /// A YAML sequence or mapping. Only kept so accessors can report it.
    Nested,
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Bool(_) => "boolean",
            Self::Date(_) => "date",
            Self::Nested => "nested value",
        }
    }
}

/// Parsed frontmatter of a source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    fields: BTreeMap<String, FieldValue>,
}

impl Frontmatter {
    /// Look up a raw value.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Required string field. Date-shaped values are returned in their textual form.
    pub fn string(&self, key: &str) -> Result<String, FieldError> {
        match self.require(key)? {
            FieldValue::String(s) => Ok(s.clone()),
            FieldValue::Date(d) => Ok(d.format(DATE_FORMAT).to_string()),
            other => Err(FieldError::mismatch(key, "string", other)),
        }
    }

    /// Required boolean field.
    pub fn bool(&self, key: &str) -> Result<bool, FieldError> {
        match self.require(key)? {
            FieldValue::Bool(b) => Ok(*b),
            other => Err(FieldError::mismatch(key, "boolean", other)),
        }
    }

    /// Required `YYYY-MM-DD` date field.
    pub fn date(&self, key: &str) -> Result<NaiveDate, FieldError> {
        match self.require(key)? {
            FieldValue::Date(d) => Ok(*d),
            FieldValue::String(s) => Err(FieldError::InvalidDate {
                key: key.to_string(),
                value: s.clone(),
            }),
            other => Err(FieldError::mismatch(key, "date", other)),
        }
    }

    /// Optional boolean field; `Ok(None)` when absent.
    pub fn opt_bool(&self, key: &str) -> Result<Option<bool>, FieldError> {
        self.optional(key, Self::bool)
    }

    /// Optional date field; `Ok(None)` when absent.
    pub fn opt_date(&self, key: &str) -> Result<Option<NaiveDate>, FieldError> {
        self.optional(key, Self::date)
    }

    fn require(&self, key: &str) -> Result<&FieldValue, FieldError> {
        self.fields
            .get(key)
            .ok_or_else(|| FieldError::MissingField(key.to_string()))
    }

    fn optional<T>(
        &self,
        key: &str,
        get: impl Fn(&Self, &str) -> Result<T, FieldError>,
    ) -> Result<Option<T>, FieldError> {
        if self.fields.contains_key(key) {
            get(self, key).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Split a source file into its frontmatter and the remaining body.
///
/// Lines are scanned until the first `---` line, then collected until the next one.
/// Everything after the closing delimiter line is returned untouched. Scanning never
/// continues into the body, so a `---` rule inside the post is left alone.
pub fn parse_frontmatter(source: &[u8]) -> Result<(Frontmatter, &[u8]), FrontmatterError> {
    let mut pos = 0;
    let mut block_start = None;

    while pos < source.len() {
        let end = source[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(source.len(), |i| pos + i + 1);

        if is_delimiter(&source[pos..end]) {
            match block_start {
                None => block_start = Some(end),
                Some(start) => {
                    let frontmatter = parse_block(&source[start..pos])?;
                    return Ok((frontmatter, &source[end..]));
                }
            }
        }

        pos = end;
    }

    match block_start {
        None => Err(FrontmatterError::Missing),
        Some(_) => Err(FrontmatterError::Unclosed),
    }
}

fn is_delimiter(line: &[u8]) -> bool {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line == DELIMITER
}

fn parse_block(block: &[u8]) -> Result<Frontmatter, FrontmatterError> {
    let text = std::str::from_utf8(block).map_err(|_| FrontmatterError::InvalidUtf8)?;

    if text.trim().is_empty() {
        return Ok(Frontmatter::default());
    }

    let value: Value = serde_yaml::from_str(text)
        .map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?;

    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(Frontmatter::default()),
        _ => return Err(FrontmatterError::NotAMapping),
    };

    let mut fields = BTreeMap::new();
    for (key, value) in mapping {
        let key = match key {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(FrontmatterError::InvalidYaml(
                    "frontmatter keys must be scalars".to_string(),
                ))
            }
        };
        if let Some(value) = convert(value) {
            fields.insert(key, value);
        }
    }

    Ok(Frontmatter { fields })
}

fn convert(value: Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Bool(b)),
        Value::Number(n) => Some(FieldValue::String(n.to_string())),
        Value::String(s) => Some(match parse_date(&s) {
            Some(date) => FieldValue::Date(date),
            None => FieldValue::String(s),
        }),
        Value::Sequence(_) | Value::Mapping(_) => Some(FieldValue::Nested),
        Value::Tagged(tagged) => convert(tagged.value),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    // chrono accepts unpadded fields, the source format does not
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Errors that can occur when extracting frontmatter.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("No frontmatter block - missing opening ---")]
    Missing,

    #[error("Unclosed frontmatter block - missing closing ---")]
    Unclosed,

    #[error("Frontmatter is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid YAML in frontmatter: {0}")]
    InvalidYaml(String),

    #[error("Frontmatter must be a YAML mapping")]
    NotAMapping,
}

/// Errors from the typed frontmatter accessors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("field `{key}` should be a {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field `{key}` is not a YYYY-MM-DD date: {value:?}")]
    InvalidDate { key: String, value: String },
}

impl FieldError {
    fn mismatch(key: &str, expected: &'static str, found: &FieldValue) -> Self {
        Self::TypeMismatch {
            key: key.to_string(),
            expected,
            found: found.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn extracts_frontmatter_at_start() {
        let source = b"---\ndate: 2000-10-20\ntitle: my post title\n---\n";

        let (fm, body) = parse_frontmatter(source).unwrap();

        assert_eq!(fm.len(), 2);
        assert_eq!(fm.string("title").unwrap(), "my post title");
        assert_eq!(fm.date("date").unwrap(), date(2000, 10, 20));
        assert!(body.is_empty());
    }

    #[test]
    fn skips_lines_before_opening_delimiter() {
        let source = b"before\n---\ndate: 2001-10-20\ntitle: random title\n---\nafter frontmatter\nend";

        let (fm, body) = parse_frontmatter(source).unwrap();

        assert_eq!(fm.string("title").unwrap(), "random title");
        assert_eq!(fm.string("date").unwrap(), "2001-10-20");
        assert_eq!(body, b"after frontmatter\nend");
    }

    #[test]
    fn leaves_body_untouched() {
        let source = b"---\ntitle: Rules\n---\n\n  Intro\n\n---\n\nMore after a rule\n";

        let (fm, body) = parse_frontmatter(source).unwrap();

        assert_eq!(fm.string("title").unwrap(), "Rules");
        assert_eq!(body, b"\n  Intro\n\n---\n\nMore after a rule\n");
    }

    #[test]
    fn accepts_crlf_and_closing_delimiter_at_eof() {
        let (fm, body) = parse_frontmatter(b"---\r\ntitle: Windows\r\n---\r\nbody").unwrap();
        assert_eq!(fm.string("title").unwrap(), "Windows");
        assert_eq!(body, b"body");

        let (fm, body) = parse_frontmatter(b"---\ntitle: Settings\n---").unwrap();
        assert_eq!(fm.string("title").unwrap(), "Settings");
        assert!(body.is_empty());
    }

    #[test]
    fn errors_on_unclosed_frontmatter() {
        let result = parse_frontmatter(b"---\ntitle: Test\n# No closing\n");

        assert!(matches!(result, Err(FrontmatterError::Unclosed)));
    }

    #[test]
    fn errors_on_missing_frontmatter() {
        let result = parse_frontmatter(b"# Just Markdown\n\nNo frontmatter here.\n");

        assert!(matches!(result, Err(FrontmatterError::Missing)));
    }

    #[test]
    fn errors_on_invalid_yaml() {
        let result = parse_frontmatter(b"---\ntitle: [invalid yaml\n---\n");

        assert!(matches!(result, Err(FrontmatterError::InvalidYaml(_))));
    }

    #[test]
    fn errors_on_scalar_document() {
        let result = parse_frontmatter(b"---\njust a sentence\n---\n");

        assert!(matches!(result, Err(FrontmatterError::NotAMapping)));
    }

    #[test]
    fn empty_block_is_empty_mapping() {
        let (fm, body) = parse_frontmatter(b"---\n---\nbody\n").unwrap();

        assert!(fm.is_empty());
        assert_eq!(body, b"body\n");
    }

    #[test]
    fn types_scalar_values() {
        let source = b"---\ntitle: Hello\ndraft: true\ncount: 3\ndate: 2021-06-15\nnull_field: ~\ntags: [a, b]\n---\n";

        let (fm, _) = parse_frontmatter(source).unwrap();

        assert_eq!(fm.get("title"), Some(&FieldValue::String("Hello".into())));
        assert_eq!(fm.get("draft"), Some(&FieldValue::Bool(true)));
        assert_eq!(fm.get("count"), Some(&FieldValue::String("3".into())));
        assert_eq!(fm.get("date"), Some(&FieldValue::Date(date(2021, 6, 15))));
        assert_eq!(fm.get("tags"), Some(&FieldValue::Nested));
        assert_eq!(fm.get("null_field"), None);
    }

    #[test]
    fn typed_accessors_report_failures() {
        let source = b"---\ntitle: Hello\ndraft: yes please\ndate: 2021-13-40\n---\n";
        let (fm, _) = parse_frontmatter(source).unwrap();

        assert_eq!(
            fm.string("missing"),
            Err(FieldError::MissingField("missing".into()))
        );
        assert!(matches!(
            fm.bool("draft"),
            Err(FieldError::TypeMismatch { expected: "boolean", found: "string", .. })
        ));
        assert!(matches!(fm.date("date"), Err(FieldError::InvalidDate { .. })));
        assert_eq!(fm.opt_bool("short"), Ok(None));
        assert_eq!(fm.opt_date("updated"), Ok(None));
    }
}
