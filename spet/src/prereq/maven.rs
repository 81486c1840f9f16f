// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

pub struct Maven {}

impl Prereq for Maven {
    fn source(&self, rctx: &RunCtx) -> Source {
        let ver = &rctx.versions.maven;
        let archive = format!("apache-maven-{}-bin.tar.gz", ver);
        Source::new(
            "Maven",
            &format!(
                "http://apache.mirrors.lucidnetworks.net/maven/maven-{}/{}/binaries/{}",
                ver_prefix(ver, 1),
                ver,
                &archive
            ),
            &archive,
            &format!("apache-maven-{}", ver),
            "maven",
        )
    }
}
