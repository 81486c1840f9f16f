// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;
use std::os::unix::fs::PermissionsExt;

pub struct MySql {}

impl Prereq for MySql {
    fn source(&self, rctx: &RunCtx) -> Source {
        let vers = &rctx.versions;
        let base = format!("mysql-{}-linux-glibc{}-x86_64", &vers.mysql, &vers.mysql_glibc);
        let archive = format!("{}.tar.gz", &base);
        Source::new(
            "MySQL",
            &format!(
                "https://dev.mysql.com/get/Downloads/MySQL-{}/{}",
                ver_prefix(&vers.mysql, 2),
                &archive
            ),
            &archive,
            &base,
            "mysql",
        )
    }

    /// Initialize the data directory without a root password.
    fn install(&self, rctx: &mut RunCtx) -> Result<()> {
        let mysql_dir = rctx.src("mysql");
        let files_dir = mysql_dir.join("mysql-files");
        check_exists(&mysql_dir)?;

        if files_dir.is_dir() && fs::read_dir(&files_dir)?.next().is_some() {
            return Ok(());
        }
        fs::create_dir_all(&files_dir)?;
        fs::set_permissions(&files_dir, fs::Permissions::from_mode(0o750))?;

        info!("mysql: Initializing {:?}", &files_dir);
        rctx.set_status("Initializing MySQL");
        let dirs = format!(
            "--user=root --basedir={} --datadir={}",
            mysql_dir.display(),
            files_dir.display()
        );
        shell_output_lenient(
            &format!("./bin/mysqld --initialize-insecure {}", &dirs),
            Some(&mysql_dir),
            &[],
        )?;
        shell_output_lenient(
            &format!("./bin/mysql_ssl_rsa_setup {}", &dirs),
            Some(&mysql_dir),
            &[],
        )?;
        Ok(())
    }
}
