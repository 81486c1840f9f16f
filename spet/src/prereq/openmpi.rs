// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

pub struct OpenMpi {}

impl Prereq for OpenMpi {
    fn source(&self, rctx: &RunCtx) -> Source {
        let ver = &rctx.versions.openmpi;
        let archive = format!("openmpi-{}.tar.gz", ver);
        Source::new(
            "OpenMPI",
            &format!(
                "https://www.open-mpi.org/software/ompi/v{}/downloads/{}",
                ver_prefix(ver, 2),
                &archive
            ),
            &archive,
            &format!("openmpi-{}", ver),
            "openmpi",
        )
    }

    fn build(&self, rctx: &mut RunCtx) -> Result<()> {
        let mpi_dir = rctx.src("openmpi");
        let build_dir = rctx.mpi_dir();
        if build_dir.join("bin/mpicc").exists() {
            return Ok(());
        }
        check_exists(&mpi_dir)?;
        fs::create_dir_all(&build_dir)?;

        let cflags = with_opt_level(rctx.sysinfo.cflags());
        let cores = rctx.nr_cores();
        info!(
            "openmpi: Compiling with {} Make threads and {:?} CFLAGS",
            cores, &cflags
        );
        rctx.set_status("Configuring OpenMPI");
        let env = [env_set("CFLAGS", &cflags)];
        shell_output(
            &format!("../configure --prefix={}", build_dir.display()),
            Some(&build_dir),
            &env,
        )?;
        rctx.set_status("Compiling OpenMPI");
        shell_output(&format!("make -s -j {} all", cores), Some(&build_dir), &env)?;
        Ok(())
    }

    fn install(&self, rctx: &mut RunCtx) -> Result<()> {
        let build_dir = rctx.mpi_dir();
        let mpicc = build_dir.join("bin/mpicc");
        if mpicc.exists() {
            return Ok(());
        }
        check_exists(&build_dir)?;
        rctx.set_status("Installing OpenMPI");
        shell_output(
            &format!("sudo -E make -s -j {} install", rctx.nr_cores()),
            Some(&build_dir),
            &[],
        )?;
        check_exists(&mpicc)
    }
}
