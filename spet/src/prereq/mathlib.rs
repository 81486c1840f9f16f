// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

pub const MKL_INSTALL_DIR: &str = "/opt/intel/mkl";
const SILENT_CFG: &str = include_str!("../../provided/silent.cfg");

/// Shown wherever AMD BLIS is credited.
pub const BLIS_COPYRIGHTS: [&str; 2] = [
    "* Copyright (C) 2017, Advanced Micro Devices, Inc.",
    "* Copyright (C) 2014, The University of Texas at Austin",
];

/// BLAS implementation HPL links against. The processor vendor decides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathLib {
    Mkl,
    Blis,
    OpenBlas,
}

impl MathLib {
    pub fn for_processor(processor_name: &str) -> Self {
        let name = processor_name.to_lowercase();
        if name.contains("intel") {
            Self::Mkl
        } else if name.contains("amd") {
            Self::Blis
        } else {
            Self::OpenBlas
        }
    }

    /// The vendor library if it's actually installed, OpenBLAS otherwise.
    pub fn available(rctx: &RunCtx) -> Self {
        match Self::for_processor(rctx.sysinfo.processor_name()) {
            Self::Mkl if Path::new(MKL_INSTALL_DIR).is_dir() => Self::Mkl,
            Self::Blis if rctx.src("blis").is_dir() => Self::Blis,
            _ => Self::OpenBlas,
        }
    }

    /// Key stored in the results.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mkl => "mkl",
            Self::Blis => "blis",
            Self::OpenBlas => "openblas",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mkl => "Intel(R) MKL",
            Self::Blis => "AMD BLIS",
            Self::OpenBlas => "OpenBLAS",
        }
    }

    pub fn prereq(&self) -> Box<dyn Prereq> {
        match self {
            Self::Mkl => Box::new(Mkl {}),
            Self::Blis => Box::new(Blis {}),
            Self::OpenBlas => Box::new(OpenBlas {}),
        }
    }
}

pub struct Mkl {}

impl Prereq for Mkl {
    fn source(&self, rctx: &RunCtx) -> Source {
        let ver = &rctx.versions.mkl;
        let archive = format!("l_mkl_{}.tgz", ver);
        let extracted = format!("l_mkl_{}", ver);
        match rctx.versions.mkl_url.as_ref() {
            Some(url) => Source::new("MKL", url, &archive, &extracted, "mkl"),
            None => Source::manual(
                "MKL",
                &archive,
                &extracted,
                "mkl",
                &format!(
                    "Unable to find an URL for MKL. Please visit \
                     https://software.intel.com/en-us/mkl to download MKL and place \
                     the archive in the {} directory.",
                    rctx.src_dir.display()
                ),
            ),
        }
    }

    fn install(&self, rctx: &mut RunCtx) -> Result<()> {
        if Path::new(MKL_INSTALL_DIR).is_dir() {
            return Ok(());
        }
        let mkl_dir = rctx.src("mkl");
        check_exists(&mkl_dir)?;

        let cfg = rctx.src("provided/silent.cfg");
        write_file(&cfg, SILENT_CFG, false)?;
        info!("mkl: Installing into {}", MKL_INSTALL_DIR);
        rctx.set_status("Installing MKL");
        shell_output_lenient(
            &format!(
                "{}/install.sh --silent \"{}\"",
                mkl_dir.display(),
                cfg.display()
            ),
            Some(&mkl_dir),
            &[],
        )?;
        check_exists(Path::new(MKL_INSTALL_DIR))
    }
}

pub struct Blis {}

impl Prereq for Blis {
    fn source(&self, rctx: &RunCtx) -> Source {
        let ver = &rctx.versions.blis;
        Source::manual(
            "BLIS",
            &format!("AMD-BLIS-Linux-{}.tar.gz", ver),
            &format!("amd-blis-{}", ver.to_lowercase()),
            "blis",
            &format!(
                "Unable to find an URL for BLIS. Please visit \
                 \"http://developer.amd.com/amd-cpu-libraries/blas-library/\" to download \
                 BLIS and place the archive in the \"{}\" directory.",
                rctx.src_dir.display()
            ),
        )
    }
}

pub struct OpenBlas {}

impl Prereq for OpenBlas {
    fn source(&self, rctx: &RunCtx) -> Source {
        let ver = &rctx.versions.openblas;
        Source::new(
            "OpenBLAS",
            &format!("https://github.com/xianyi/OpenBLAS/archive/v{}.tar.gz", ver),
            &format!("openblas-{}.tar.gz", ver),
            &format!("OpenBLAS-{}", ver),
            "openblas",
        )
    }

    fn build(&self, rctx: &mut RunCtx) -> Result<()> {
        let blas_dir = rctx.src("openblas");
        let lib = blas_dir.join("libopenblas.so");
        if lib.exists() {
            return Ok(());
        }
        check_exists(&blas_dir)?;

        let cflags = rctx.cflags() + rctx.avx_flags();
        let (threads, cores) = (rctx.nr_threads(), rctx.nr_cores());
        info!(
            "openblas: Compiling with {} OMP threads, {} Make threads and {:?} CFLAGS",
            threads, cores, &cflags
        );
        rctx.set_status("Compiling OpenBLAS");
        shell_output(
            &format!(
                "make -j {} FC={} CC={} USE_OPENMP=1 USE_THREAD=1",
                cores,
                rctx.mpi_bin("mpifort").display(),
                rctx.mpi_bin("mpicc").display()
            ),
            Some(&blas_dir),
            &[
                env_set("CFLAGS", &cflags),
                env_set("OMP_NUM_THREADS", &threads.to_string()),
            ],
        )?;
        check_exists(&lib)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::test_rctx;

    #[test]
    fn test_for_processor() {
        for pair in &[
            ("Intel(R) Xeon(R) Gold 6148 CPU @ 2.40GHz", MathLib::Mkl),
            ("AMD EPYC 7601 32-Core Processor", MathLib::Blis),
            ("Cavium ThunderX2(R) CPU CN9980 v2.1 @ 2.20GHz", MathLib::OpenBlas),
            ("Unknown Processor", MathLib::OpenBlas),
        ] {
            assert_eq!(MathLib::for_processor(pair.0), pair.1);
        }
        assert_eq!(MathLib::Blis.as_str(), "blis");
    }

    #[test]
    fn test_manual_sources() {
        let root = tempfile::tempdir().unwrap();
        let mut rctx = test_rctx(root.path());

        let blis = Blis {}.source(&rctx);
        assert_eq!(blis.archive, "AMD-BLIS-Linux-0.9-11-Beta.tar.gz");
        assert_eq!(blis.extracted, "amd-blis-0.9-11-beta");
        assert!(blis.url.is_none());

        rctx.versions.mkl_url = None;
        let mkl = Mkl {}.source(&rctx);
        let err = mkl.fetch(&mut rctx).unwrap_err().to_string();
        assert!(err.starts_with("Unable to find an URL for MKL."));
        assert!(err.contains(&rctx.src_dir.display().to_string()));
    }
}
