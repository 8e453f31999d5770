//! Resume state for enrichment runs.
//!
//! One JSON file holds a section per checkpoint key (`openai`,
//! `gemini_false_positive`, ...). Saving rewrites the whole file but leaves
//! other sections untouched.
use super::StoredResult;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Uppercased code -> result; presence means the code needs no new query.
    #[serde(default)]
    pub results: BTreeMap<String, StoredResult>,
    /// Model that answered the most recent batch.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Section for `key`, or an empty checkpoint when none was saved yet.
    pub fn load(&self, key: &str) -> Result<Checkpoint> {
        let sections = self.read_sections()?;
        let Some(section) = sections.get(key) else {
            return Ok(Checkpoint::default());
        };
        serde_json::from_value(section.clone()).with_context(|| {
            format!(
                "parse checkpoint section {key:?} in {}",
                self.path.display()
            )
        })
    }

    /// Replace the section for `key`, keeping every other section verbatim.
    pub fn save(&self, key: &str, checkpoint: &Checkpoint) -> Result<()> {
        let mut sections = self.read_sections()?;
        let value = serde_json::to_value(checkpoint).context("serialize checkpoint")?;
        sections.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&Value::Object(sections))
            .context("serialize checkpoint file")?;
        fs::write(&self.path, text.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }

    fn read_sections(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let bytes =
            fs::read(&self.path).with_context(|| format!("read {}", self.path.display()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse checkpoint JSON {}", self.path.display()))?;
        match value {
            Value::Object(sections) => Ok(sections),
            _ => Err(anyhow!(
                "checkpoint {} is not a JSON object",
                self.path.display()
            )),
        }
    }
}
