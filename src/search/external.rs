//! External CLI backend (spec §4.9 "External CLI"): available iff a
//! configured binary is on `PATH`. Mirrors the teacher's use of `which` to
//! probe for an optional helper binary before depending on it.

use std::process::Command;

use serde::Deserialize;

use crate::error::{Error, Result};

use super::{SearchBackend, SearchResult};

#[derive(Debug, Deserialize)]
struct ExternalHit {
    id: String,
    content: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    component: Option<String>,
}

pub struct ExternalCliBackend {
    binary: String,
    collection: String,
}

impl ExternalCliBackend {
    pub fn new(binary: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            collection: collection.into(),
        }
    }

    fn ensure_collection(&self) -> Result<()> {
        self.run(&["ensure-collection", &self.collection]).map(|_| ())
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| Error::TransportFailure(format!("{}: {e}", self.binary)))?;
        if !output.status.success() {
            return Err(Error::TransportFailure(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl SearchBackend for ExternalCliBackend {
    fn name(&self) -> &'static str {
        "external_cli"
    }

    fn available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    fn search(&self, query: &str, scope: Option<&str>, limit: usize) -> Result<Vec<SearchResult>> {
        self.ensure_collection()?;
        let limit_str = limit.to_string();
        let mut args = vec!["search", "--collection", &self.collection, "--query", query, "--limit", &limit_str];
        if let Some(scope) = scope {
            args.push("--scope");
            args.push(scope);
        }
        let stdout = self.run(&args)?;
        let hits: Vec<ExternalHit> = serde_json::from_str(stdout.trim())
            .map_err(|e| Error::TransportFailure(format!("malformed search CLI output: {e}")))?;
        Ok(hits
            .into_iter()
            .map(|h| SearchResult {
                id: h.id,
                content: h.content,
                source: "external_cli".to_string(),
                score: h.score,
                component: h.component,
            })
            .collect())
    }

    fn reindex(&self) -> Result<usize> {
        self.ensure_collection()?;
        let stdout = self.run(&["reindex", "--collection", &self.collection])?;
        stdout
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::TransportFailure("reindex did not return a count".to_string()))
    }
}
