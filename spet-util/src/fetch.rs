// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Context, Result};
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:57.0) Gecko/20100101 Firefox/57.0";
const DOWNLOAD_TIMEOUT: u64 = 3600;

fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.to_path_buf().into_os_string();
    partial.push(".partial");
    PathBuf::from(partial)
}

/// Fetch `url` into `path`. The body lands in `path.partial` first and is
/// renamed on success.
pub fn download<P: AsRef<Path>>(url: &str, path: P) -> Result<()> {
    let path = path.as_ref();
    let partial = partial_path(path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    info!("fetch: Downloading {}", url);
    let resp = minreq::get(url)
        .with_header("User-Agent", USER_AGENT)
        .with_timeout(DOWNLOAD_TIMEOUT)
        .send()
        .with_context(|| format!("Fetching {}", url))?;
    if resp.status_code < 200 || resp.status_code >= 300 {
        bail!(
            "Fetching {} failed ({} {})",
            url,
            resp.status_code,
            &resp.reason_phrase
        );
    }

    let body = resp.as_bytes();
    fs::write(&partial, body).with_context(|| format!("Writing {:?}", &partial))?;
    fs::rename(&partial, path)?;
    debug!("fetch: Saved {} bytes to {:?}", body.len(), path);
    Ok(())
}

fn unpack<R: Read>(reader: R, dest: &Path) -> Result<()> {
    tar::Archive::new(reader)
        .unpack(dest)
        .with_context(|| format!("Unpacking into {:?}", dest))
}

/// Unpack a `.tar`, `.tar.gz` or `.tgz` archive into `dest`.
pub fn extract_tar<P: AsRef<Path>, Q: AsRef<Path>>(archive: P, dest: Q) -> Result<()> {
    let (archive, dest) = (archive.as_ref(), dest.as_ref());
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    fs::create_dir_all(dest)?;
    let f = fs::File::open(archive).with_context(|| format!("Opening {:?}", archive))?;
    debug!("fetch: Extracting {:?} into {:?}", archive, dest);

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let decoder =
            libflate::gzip::Decoder::new(f).with_context(|| format!("Reading {:?}", archive))?;
        unpack(decoder, dest)
    } else if name.ends_with(".tar") {
        unpack(f, dest)
    } else {
        bail!("Unknown archive format {:?}", archive);
    }
}

/// Fill `area` so that about `comp` of it compresses away. Each 512 byte
/// block starts with random words and is padded with zeros.
fn fill_area_with_random<R: Rng + ?Sized>(area: &mut [u8], comp: f64, rng: &mut R) {
    const BLOCK_SIZE: usize = 512;
    let rands_per_block = (((BLOCK_SIZE as f64) * (1.0 - comp)) as usize).min(BLOCK_SIZE);

    for block in area.chunks_mut(BLOCK_SIZE) {
        let nr_rands = rands_per_block.min(block.len());
        rng.fill(&mut block[..nr_rands]);
        for byte in block[nr_rands..].iter_mut() {
            *byte = 0;
        }
    }
}

/// Write a `size` byte file which zlib can shrink by about `comp`. The
/// content is deterministic so that runs on different machines compress
/// the same data.
pub fn generate_corpus<P: AsRef<Path>>(path: P, size: u64, comp: f64) -> Result<()> {
    const CHUNK_SIZE: usize = 1 << 20;

    let path = path.as_ref();
    let partial = partial_path(path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    info!(
        "fetch: Generating {} corpus at {:?}",
        super::format_size(size),
        path
    );
    let mut rng = SmallRng::seed_from_u64(size);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut w = BufWriter::new(
        fs::File::create(&partial).with_context(|| format!("Creating {:?}", &partial))?,
    );

    let mut left = size;
    while left > 0 {
        if super::prog_exiting() {
            drop(w);
            let _ = fs::remove_file(&partial);
            bail!("Program exiting");
        }
        let len = left.min(CHUNK_SIZE as u64) as usize;
        fill_area_with_random(&mut buf[..len], comp, &mut rng);
        w.write_all(&buf[..len])?;
        left -= len as u64;
    }
    w.flush()?;
    drop(w);

    fs::rename(&partial, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_area() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut area = vec![0xffu8; 2048];
        fill_area_with_random(&mut area, 0.75, &mut rng);
        for block in area.chunks(512) {
            assert!(block[128..].iter().all(|b| *b == 0));
            assert!(block[..128].iter().any(|b| *b != 0));
        }
    }

    #[test]
    fn test_generate_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a/corpus.txt");
        let b = dir.path().join("b/corpus.txt");
        generate_corpus(&a, 3 << 20 | 100, 0.5).unwrap();
        generate_corpus(&b, 3 << 20 | 100, 0.5).unwrap();

        let (da, db) = (fs::read(&a).unwrap(), fs::read(&b).unwrap());
        assert_eq!(da.len(), 3 << 20 | 100);
        assert!(da == db);
        assert!(!partial_path(&a).exists());
    }

    #[test]
    fn test_extract_tar() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg-1.0.tar.gz");

        let enc = libflate::gzip::Encoder::new(fs::File::create(&archive).unwrap()).unwrap();
        let mut builder = tar::Builder::new(enc);
        let data = b"int main(void) { return 0; }\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "pkg-1.0/main.c", &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().into_result().unwrap();

        extract_tar(&archive, dir.path()).unwrap();
        assert_eq!(
            fs::read(dir.path().join("pkg-1.0/main.c")).unwrap(),
            data.to_vec()
        );
        assert!(extract_tar(dir.path().join("pkg.zip"), dir.path()).is_err());
    }
}
