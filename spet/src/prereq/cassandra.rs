// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

pub struct Cassandra {}

impl Prereq for Cassandra {
    fn source(&self, rctx: &RunCtx) -> Source {
        let ver = &rctx.versions.cassandra;
        let archive = format!("apache-cassandra-{}-bin.tar.gz", ver);
        Source::new(
            "Cassandra",
            &format!(
                "http://www.gtlib.gatech.edu/pub/apache/cassandra/{}/{}",
                ver, &archive
            ),
            &archive,
            &format!("apache-cassandra-{}", ver),
            "cassandra",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::test_rctx;

    #[test]
    fn test_sources() {
        let root = tempfile::tempdir().unwrap();
        let rctx = test_rctx(root.path());
        for (src, url, extracted) in &[
            (
                Cassandra {}.source(&rctx),
                "http://www.gtlib.gatech.edu/pub/apache/cassandra/3.11.1/apache-cassandra-3.11.1-bin.tar.gz",
                "apache-cassandra-3.11.1",
            ),
            (
                crate::prereq::maven::Maven {}.source(&rctx),
                "http://apache.mirrors.lucidnetworks.net/maven/maven-3/3.5.2/binaries/apache-maven-3.5.2-bin.tar.gz",
                "apache-maven-3.5.2",
            ),
        ] {
            assert_eq!(src.url.as_deref(), Some(*url));
            assert_eq!(&src.extracted, extracted);
        }
    }
}
