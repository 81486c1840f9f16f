// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{JobSpec, PackageVersions, SysInfo};
use spet_util::*;

/// Outcome of one benchmark job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResult {
    pub kind: String,
    pub title: String,
    pub spec: JobSpec,
    pub started_at: u64,
    pub ended_at: u64,
    pub result: serde_json::Value,
    pub commands: Vec<String>,
}

impl JobResult {
    pub fn error(&self) -> Option<&str> {
        self.result.get("error").and_then(|v| v.as_str())
    }

    pub fn skipped(&self) -> bool {
        self.result
            .get("skipped")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Everything a run produced. Saved as `*.spet.json` so that the text
/// report can be regenerated later.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultFile {
    pub version: String,
    pub run_name: String,
    pub started_at: u64,
    pub ended_at: u64,
    pub sysinfo: SysInfo,
    pub avx512: bool,
    pub mathlib: String,
    pub versions: PackageVersions,
    pub jobs: Vec<JobResult>,
}

impl ResultFile {
    pub fn record(&mut self, job: JobResult) {
        self.jobs.retain(|j| j.title != job.title);
        self.jobs.push(job);
    }

    pub fn find(&self, kind: &str) -> Option<&JobResult> {
        self.jobs.iter().find(|j| j.kind == kind)
    }

    /// Results keyed by bench title as stored in `*.results.json`.
    pub fn results(&self) -> BTreeMap<String, serde_json::Value> {
        self.jobs
            .iter()
            .map(|j| (j.title.clone(), j.result.clone()))
            .collect()
    }

    /// Commands keyed by bench title.
    pub fn commands(&self) -> BTreeMap<String, Vec<String>> {
        self.jobs
            .iter()
            .map(|j| (j.title.clone(), j.commands.clone()))
            .collect()
    }

    pub fn save_results<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut serialized = serde_json::to_string_pretty(&self.results())?;
        serialized += "\n";
        write_file(path, &serialized, false)
    }
}

impl JsonLoad for ResultFile {}
impl JsonSave for ResultFile {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(kind: &str, title: &str, result: serde_json::Value) -> JobResult {
        JobResult {
            kind: kind.into(),
            title: title.into(),
            spec: JobSpec::dfl(kind),
            started_at: 1,
            ended_at: 2,
            result,
            commands: vec![format!("Run: {}", kind)],
        }
    }

    #[test]
    fn test_record_and_results() {
        let mut rf = ResultFile::default();
        rf.record(job("zlib", "zlib", json!({"unit": "s"})));
        rf.record(job("stream", "STREAM", json!({"skipped": true})));
        rf.record(job("lmbench", "LMbench", json!({"error": "no output"})));
        rf.record(job("zlib", "zlib", json!({"unit": "s", "median": 3.0})));

        assert_eq!(rf.jobs.len(), 3);
        assert!(rf.find("stream").unwrap().skipped());
        assert_eq!(rf.find("lmbench").unwrap().error(), Some("no output"));

        let keys: Vec<String> = rf.results().keys().cloned().collect();
        assert_eq!(keys, vec!["LMbench", "STREAM", "zlib"]);
        assert_eq!(rf.results()["zlib"]["median"], json!(3.0));
        assert_eq!(rf.commands()["STREAM"], vec!["Run: stream".to_string()]);
    }

    #[test]
    fn test_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut rf = ResultFile::default();
        rf.version = "1.2.0".into();
        rf.record(job("docker", "Docker", json!({"times": [1.0, 2.0]})));

        let results = dir.path().join("r.results.json");
        rf.save_results(&results).unwrap();
        let loaded: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&results).unwrap()).unwrap();
        assert_eq!(loaded["Docker"]["times"], json!([1.0, 2.0]));

        let full = dir.path().join("r.spet.json");
        rf.save(&full).unwrap();
        let rf2 = ResultFile::load(&full).unwrap();
        assert_eq!(rf2.version, "1.2.0");
        assert_eq!(rf2.jobs.len(), 1);
    }
}
