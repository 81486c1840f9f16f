// Copyright (c) Facebook, Inc. and its affiliates.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type JobProps = Vec<BTreeMap<String, String>>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub kind: String,
    pub id: Option<String>,
    pub props: JobProps,
}

impl JobSpec {
    pub fn new(kind: &str, id: Option<&str>, props: JobProps) -> Self {
        assert!(props.len() > 0);
        Self {
            kind: kind.to_string(),
            id: id.map(Into::into),
            props,
        }
    }

    /// The spec used when a bench runs with everything at its default.
    pub fn dfl(kind: &str) -> Self {
        Self::new(kind, None, vec![Default::default()])
    }
}

impl std::fmt::Display for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "job[{}:{}]",
            self.kind,
            self.id.as_deref().unwrap_or("-")
        )
    }
}

pub fn format_job_props(props: &JobProps) -> String {
    let mut buf = String::new();
    for (i, propset) in props.iter().enumerate() {
        if i > 0 {
            buf += ":";
        }
        let pairs: Vec<String> = propset
            .iter()
            .map(|(k, v)| {
                if v.len() > 0 {
                    format!("{}={}", k, v)
                } else {
                    k.to_string()
                }
            })
            .collect();
        buf += &pairs.join(",");
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_job_props() {
        let mut first = BTreeMap::new();
        first.insert("runs".to_string(), "5".to_string());
        first.insert("detailed".to_string(), "".to_string());
        let mut second = BTreeMap::new();
        second.insert("ops".to_string(), "1000".to_string());

        assert_eq!(format_job_props(&vec![first, second]), "detailed,runs=5:ops=1000");
        assert_eq!(format_job_props(&JobSpec::dfl("stream").props), "");
    }

    #[test]
    fn test_display() {
        let spec = JobSpec::new("docker", Some("small"), vec![Default::default()]);
        assert_eq!(format!("{}", &spec), "job[docker:small]");
        assert_eq!(format!("{}", JobSpec::dfl("zlib")), "job[zlib:-]");
    }
}
