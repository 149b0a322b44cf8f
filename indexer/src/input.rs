//! Turning JSON input files into documents.
//!
//! A `.json` file holds either an array of objects or a single object; a
//! `.jsonl` file holds one object per line. Every key of an object becomes a
//! field, in the order it appears in the file.

use anyhow::{bail, Context, Result};
use ftsearch_core::Document;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn collect_input_files(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walking {}", input.display()))?;
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("{} is neither a file nor a directory", input.display());
    }
    Ok(files)
}

fn extension(p: &Path) -> Option<&str> {
    p.extension().and_then(|s| s.to_str())
}

pub fn read_documents(file: &Path) -> Result<Vec<Document>> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    if extension(file) == Some("jsonl") {
        let mut docs = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("reading {}", file.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line)
                .with_context(|| format!("unable to parse {} line {}", file.display(), n + 1))?;
            docs.push(document_from_json(value).with_context(|| format!("{} line {}", file.display(), n + 1))?);
        }
        return Ok(docs);
    }

    let json: Value = serde_json::from_reader(reader)
        .with_context(|| format!("unable to parse {}; please ensure the format is correct", file.display()))?;
    match json {
        Value::Array(arr) => arr
            .into_iter()
            .enumerate()
            .map(|(i, v)| document_from_json(v).with_context(|| format!("{} element {i}", file.display())))
            .collect(),
        obj @ Value::Object(_) => Ok(vec![document_from_json(obj)?]),
        other => bail!("{}: expected an array of objects, found {}", file.display(), kind(&other)),
    }
}

pub fn document_from_json(value: Value) -> Result<Document> {
    let map = match value {
        Value::Object(map) => map,
        other => bail!("expected a JSON object, found {}", kind(&other)),
    };
    let mut doc = Document::new();
    for (name, value) in map {
        match value {
            Value::String(s) => doc.push(name, s),
            Value::Null => {}
            Value::Bool(_) | Value::Number(_) => doc.push(name, value.to_string()),
            Value::Array(_) | Value::Object(_) => bail!("field `{name}` holds nested {}; only text is indexed", kind(&value)),
        }
    }
    Ok(doc)
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn keeps_key_order() {
        let doc = document_from_json(json!({"docno": "FT1", "headline": "h", "date": 911201})).unwrap();
        let names: Vec<&str> = doc.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["docno", "headline", "date"]);
        assert_eq!(doc.get("date"), Some("911201"));
    }

    #[test]
    fn rejects_nested_values() {
        assert!(document_from_json(json!({"tags": ["a", "b"]})).is_err());
        assert!(document_from_json(json!("just text")).is_err());
    }

    #[test]
    fn reads_array_and_lines() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ft.json"), r#"[{"text": "one"}, {"text": "two"}]"#).unwrap();
        fs::write(dir.path().join("more.jsonl"), "{\"text\": \"three\"}\n\n{\"text\": \"four\"}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = collect_input_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let total: usize = files.iter().map(|f| read_documents(f).unwrap().len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ft.json");
        fs::write(&path, "[{\"text\": ").unwrap();
        let err = read_documents(&path).unwrap_err();
        assert!(err.to_string().contains("unable to parse"));
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(collect_input_files(&dir.path().join("nope")).is_err());
    }
}
