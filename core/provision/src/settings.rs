//! Non-destructive merge of managed keys into a user-owned settings file.
//!
//! The settings file is JSON as editors write it: `//` and `/* */` comments
//! and trailing commas are tolerated on load. Only the managed top-level keys
//! are replaced; every other key survives. Output is pretty JSON with sorted
//! keys, so merging the same values twice yields identical bytes and the
//! second merge does not write at all.
//!
//! A file that cannot be parsed is treated as empty. Its original content
//! is kept next to it as `<name>.bak` before the merged document replaces it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::ProvisionError;
use crate::plan::{SettingsSection, Variables};

/// A loaded settings document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    path: PathBuf,
    values: Map<String, Value>,
    original: Option<String>,
    recovered_from_parse_error: bool,
}

impl ConfigDocument {
    /// Loads `path`, degrading to an empty document when the file is absent
    /// or unparsable.
    ///
    /// # Errors
    ///
    /// Returns `IoError` when the file exists but cannot be read for a reason
    /// other than its encoding.
    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                debug!(path = %path.display(), "settings file absent, starting empty");
                return Ok(Self::empty(path, None, false));
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                let err = ProvisionError::config_parse(path.to_path_buf(), "not valid UTF-8");
                warn!("{err}; starting from an empty document");
                let raw = std::fs::read(path).ok().map(|b| String::from_utf8_lossy(&b).into_owned());
                return Ok(Self::empty(path, raw, true));
            }
            Err(e) => {
                return Err(ProvisionError::io_error(
                    format!("failed to read {}", path.display()),
                    e,
                ));
            }
        };

        match parse_document(&content) {
            Ok(values) => Ok(Self {
                path: path.to_path_buf(),
                values,
                original: Some(content),
                recovered_from_parse_error: false,
            }),
            Err(message) => {
                let err = ProvisionError::config_parse(path.to_path_buf(), message);
                warn!("{err}; starting from an empty document");
                Ok(Self::empty(path, Some(content), true))
            }
        }
    }

    fn empty(path: &Path, original: Option<String>, recovered: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            values: Map::new(),
            original,
            recovered_from_parse_error: recovered,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn recovered_from_parse_error(&self) -> bool {
        self.recovered_from_parse_error
    }

    /// Replaces each key of `new_keys` and returns the keys whose value
    /// actually changed.
    pub fn merge(&mut self, new_keys: &Map<String, Value>) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in new_keys {
            if self.values.get(key) != Some(value) {
                changed.push(key.clone());
            }
            self.values.insert(key.clone(), value.clone());
        }
        changed
    }

    /// Serializes the document: pretty JSON, sorted keys, trailing newline.
    ///
    /// # Errors
    ///
    /// Returns `ConfigWriteError` if serialization fails.
    pub fn render(&self) -> Result<String, ProvisionError> {
        let mut text = serde_json::to_string_pretty(&Value::Object(self.values.clone()))
            .map_err(|e| ProvisionError::config_write(self.path.clone(), e.into()))?;
        text.push('\n');
        Ok(text)
    }

    /// Writes the document if its rendering differs from what was loaded.
    /// Returns whether the file was written.
    ///
    /// # Errors
    ///
    /// Returns `ConfigWriteError` if the parent directory, the backup or the
    /// file itself cannot be written.
    pub fn save(&self) -> Result<bool, ProvisionError> {
        let rendered = self.render()?;
        if self.original.as_deref() == Some(rendered.as_str()) {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProvisionError::config_write(self.path.clone(), e))?;
        }
        if self.recovered_from_parse_error
            && let Some(original) = &self.original
        {
            let backup = backup_path(&self.path);
            std::fs::write(&backup, original)
                .map_err(|e| ProvisionError::config_write(backup.clone(), e))?;
            info!(backup = %backup.display(), "kept unparsable settings file");
        }
        std::fs::write(&self.path, rendered)
            .map_err(|e| ProvisionError::config_write(self.path.clone(), e))?;
        Ok(true)
    }
}

/// A settings file path and the managed keys for it, placeholders expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedSettings {
    pub path: PathBuf,
    pub values: Map<String, Value>,
}

impl ManagedSettings {
    /// Expands the placeholders of a plan's settings section.
    ///
    /// # Errors
    ///
    /// Returns `PlanError` for an unknown placeholder.
    pub fn from_plan(section: &SettingsSection, vars: &Variables) -> Result<Self, ProvisionError> {
        let path = vars.expand_path(&section.path)?;
        let values = section
            .values
            .iter()
            .map(|(key, value)| Ok((key.clone(), vars.expand_value(value)?)))
            .collect::<Result<Map<_, _>, ProvisionError>>()?;
        Ok(Self { path, values })
    }
}

/// Outcome of [`merge_config`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub changed_keys: Vec<String>,
    pub recovered_from_parse_error: bool,
    pub written: bool,
}

/// Merges `new_keys` into the settings file at `path`.
///
/// # Errors
///
/// Returns `ConfigWriteError` when the result cannot be persisted and
/// `IoError` when the existing file cannot be read.
pub fn merge_config(
    path: &Path,
    new_keys: &Map<String, Value>,
) -> Result<MergeReport, ProvisionError> {
    let mut document = ConfigDocument::load(path)?;
    let changed_keys = document.merge(new_keys);
    let written = document.save()?;

    if written {
        info!(path = %path.display(), changed = ?changed_keys, "settings updated");
    } else {
        debug!(path = %path.display(), "settings already up to date");
    }

    Ok(MergeReport {
        changed_keys,
        recovered_from_parse_error: document.recovered_from_parse_error(),
        written,
    })
}

/// Returns where an unparsable settings file is preserved.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

fn parse_document(content: &str) -> Result<Map<String, Value>, String> {
    // Windows editors often save settings with a UTF-8 byte order mark.
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let cleaned = strip_trailing_commas(&strip_jsonc_comments(content));
    if cleaned.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected an object at the root, found {}", kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Removes `//` and `/* */` comments outside of string literals.
#[must_use]
pub fn strip_jsonc_comments(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
            }
            _ => result.push(c),
        }
    }

    result
}

/// Removes commas directly followed (ignoring whitespace) by `}` or `]`.
#[must_use]
pub fn strip_trailing_commas(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut result = String::with_capacity(content.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        result.push(c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_test_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("rigup_test_{}_{}", name, rand::random::<u64>()));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        dir
    }

    fn keys(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("Expected object"),
        }
    }

    #[test]
    fn merge_preserves_unrelated_keys() {
        let dir = temp_test_dir("merge_preserve");
        let path = dir.join("settings.json");
        std::fs::write(&path, r#"{"x": 1, "java.home": "/old"}"#).expect("Should seed");

        let report = merge_config(&path, &keys(json!({"java.home": "/new"})))
            .expect("Should merge");

        assert_eq!(report.changed_keys, vec!["java.home"]);
        let merged: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("Should read"))
                .expect("Should parse");
        assert_eq!(merged, json!({"x": 1, "java.home": "/new"}));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn second_identical_merge_is_byte_identical_and_skips_write() {
        let dir = temp_test_dir("merge_converge");
        let path = dir.join("settings.json");
        let new_keys = keys(json!({"b": [1, 2], "a": {"nested": true}}));

        let first = merge_config(&path, &new_keys).expect("Should merge");
        let bytes_after_first = std::fs::read(&path).expect("Should read");
        let second = merge_config(&path, &new_keys).expect("Should merge again");
        let bytes_after_second = std::fs::read(&path).expect("Should read");

        assert!(first.written);
        assert!(!second.written);
        assert!(second.changed_keys.is_empty());
        assert_eq!(bytes_after_first, bytes_after_second);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn output_has_sorted_keys_and_trailing_newline() {
        let dir = temp_test_dir("merge_format");
        let path = dir.join("settings.json");

        merge_config(&path, &keys(json!({"zeta": 1, "alpha": 2}))).expect("Should merge");

        let text = std::fs::read_to_string(&path).expect("Should read");
        assert!(text.ends_with("}\n"));
        assert!(text.find("alpha") < text.find("zeta"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn absent_file_and_missing_parent_are_created() {
        let dir = temp_test_dir("merge_absent");
        let path = dir.join("Code").join("User").join("settings.json");

        let report = merge_config(&path, &keys(json!({"k": "v"}))).expect("Should merge");

        assert!(report.written);
        assert!(!report.recovered_from_parse_error);
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn comments_and_trailing_commas_are_tolerated() {
        let dir = temp_test_dir("merge_jsonc");
        let path = dir.join("settings.json");
        std::fs::write(
            &path,
            "{\n  // editor font\n  \"font\": \"Fira // Code\", /* block */\n  \"list\": [1, 2,],\n}\n",
        )
        .expect("Should seed");

        let report = merge_config(&path, &keys(json!({"k": true}))).expect("Should merge");

        assert!(!report.recovered_from_parse_error);
        let doc = ConfigDocument::load(&path).expect("Should load");
        assert_eq!(doc.get("font"), Some(&json!("Fira // Code")));
        assert_eq!(doc.get("list"), Some(&json!([1, 2])));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_recovers_to_new_keys_only() {
        let dir = temp_test_dir("merge_corrupt");
        let path = dir.join("settings.json");
        std::fs::write(&path, "{ this is not json").expect("Should seed");

        let report = merge_config(&path, &keys(json!({"k": 1}))).expect("Should merge");

        assert!(report.recovered_from_parse_error);
        let merged: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("Should read"))
                .expect("Should parse");
        assert_eq!(merged, json!({"k": 1}));
        let backup = std::fs::read_to_string(backup_path(&path)).expect("Should keep backup");
        assert_eq!(backup, "{ this is not json");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn byte_order_mark_is_not_corruption() {
        let dir = temp_test_dir("merge_bom");
        let path = dir.join("settings.json");
        std::fs::write(&path, "\u{feff}{\"foo\": \"bar\"}").expect("Should seed");

        let report = merge_config(&path, &keys(json!({"k": 1}))).expect("Should merge");

        assert!(!report.recovered_from_parse_error);
        let merged: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("Should read"))
                .expect("Should parse");
        assert_eq!(merged, json!({"foo": "bar", "k": 1}));
        assert!(!backup_path(&path).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn non_object_root_is_treated_as_corrupt() {
        let dir = temp_test_dir("merge_array_root");
        let path = dir.join("settings.json");
        std::fs::write(&path, "[1, 2, 3]").expect("Should seed");

        let doc = ConfigDocument::load(&path).expect("Should load");

        assert!(doc.recovered_from_parse_error());
        assert!(doc.values().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_failure_is_config_write_error() {
        let dir = temp_test_dir("merge_write_fail");
        let blocker = dir.join("not-a-dir");
        std::fs::write(&blocker, b"file").expect("Should seed");
        let path = blocker.join("settings.json");

        let err = merge_config(&path, &keys(json!({"k": 1}))).expect_err("Should fail");

        assert!(matches!(err, ProvisionError::ConfigWriteError { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn strip_comments_respects_escaped_quotes() {
        let input = r#"{"a": "say \"hi\" // not a comment"} // comment"#;
        let stripped = strip_jsonc_comments(input);
        assert_eq!(stripped, r#"{"a": "say \"hi\" // not a comment"} "#);
    }

    #[test]
    fn strip_comments_handles_escaped_backslash_before_quote() {
        let input = "{\"path\": \"C:\\\\\"} // tail";
        assert_eq!(strip_jsonc_comments(input), "{\"path\": \"C:\\\\\"} ");
    }

    #[test]
    fn trailing_commas_inside_strings_are_kept() {
        assert_eq!(strip_trailing_commas(r#"{"a": ",}",}"#), r#"{"a": ",}"}"#);
        assert_eq!(strip_trailing_commas("[1,\n  ]"), "[1\n  ]");
    }

    #[test]
    fn empty_file_is_an_empty_document() {
        let dir = temp_test_dir("merge_empty");
        let path = dir.join("settings.json");
        std::fs::write(&path, "  \n").expect("Should seed");

        let doc = ConfigDocument::load(&path).expect("Should load");

        assert!(!doc.recovered_from_parse_error());
        assert!(doc.values().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
