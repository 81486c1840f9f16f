// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

pub const GLIBC_PREFIX: &str = "/usr/local/glibc";

pub struct Glibc {}

/// glibc refuses to build with aggressive optimizations and must be
/// optimized to some degree.
fn glibc_cflags(cflags: &str) -> String {
    let mut cflags = cflags
        .replace("-Ofast", "")
        .replace("-ffast-math", "")
        .replace("-O3", "");
    if !cflags.contains("-O") {
        cflags += " -O2 ";
    }
    cflags
}

impl Prereq for Glibc {
    fn source(&self, rctx: &RunCtx) -> Source {
        let ver = &rctx.versions.glibc;
        let archive = format!("glibc-{}.tar.gz", ver);
        Source::new(
            "glibc",
            &format!("https://ftp.gnu.org/gnu/glibc/{}", &archive),
            &archive,
            &format!("glibc-{}", ver),
            "glibc",
        )
    }

    fn build(&self, rctx: &mut RunCtx) -> Result<()> {
        let build_dir = rctx.src("glibc/build");
        if build_dir.join("libc.so").exists() {
            return Ok(());
        }
        check_exists(&rctx.src("glibc"))?;
        fs::create_dir_all(&build_dir)?;

        let cflags = glibc_cflags(rctx.sysinfo.cflags());
        let cores = rctx.nr_cores();
        info!(
            "glibc: Compiling with {} Make threads and {:?} CFLAGS",
            cores, &cflags
        );
        let env = [env_set("CFLAGS", &cflags)];
        rctx.set_status("Configuring glibc");
        shell_output(
            &format!("../configure --prefix={}", GLIBC_PREFIX),
            Some(&build_dir),
            &env,
        )?;
        rctx.set_status("Compiling glibc");
        shell_output(&format!("make -j {}", cores), Some(&build_dir), &env)?;
        check_exists(&build_dir.join("libc.so"))
    }

    fn install(&self, rctx: &mut RunCtx) -> Result<()> {
        let ld = PathBuf::from(format!("{}/lib/ld-{}.so", GLIBC_PREFIX, &rctx.versions.glibc));
        if ld.exists() {
            return Ok(());
        }
        let build_dir = rctx.src("glibc/build");
        check_exists(&build_dir)?;
        rctx.set_status("Installing glibc");
        shell_output(
            &format!("sudo -E make -j {} install", rctx.nr_cores()),
            Some(&build_dir),
            &[],
        )?;
        check_exists(&ld)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glibc_cflags() {
        for pair in &[
            ("-march=native -mtune=native", "-march=native -mtune=native -O2 "),
            ("-march=native -O3", "-march=native  -O2 "),
            ("-march=native -Ofast -ffast-math", "-march=native   -O2 "),
            ("-march=native -O1", "-march=native -O1"),
        ] {
            assert_eq!(glibc_cflags(pair.0), pair.1);
        }
    }
}
