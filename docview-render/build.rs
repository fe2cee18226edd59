use std::env;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use ureq::{AgentBuilder, Error as UreqError};
use walkdir::WalkDir;
use zip::read::ZipArchive;

const PDFIUM_VERSION: &str = "7350";
const RELEASE_PREFIX: &str = "chromium";
const RELEASES_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";
const LIBRARY_ENV: &str = "DOCVIEW_PDFIUM_LIBRARY_PATH";

const WATCHED_ENV: &[&str] = &[
    "DOCVIEW_PDFIUM_SKIP_DOWNLOAD",
    "DOCVIEW_PDFIUM_ARCHIVE",
    "DOCVIEW_PDFIUM_VERSION",
    "DOCVIEW_PDFIUM_PLATFORM",
    "DOCVIEW_PDFIUM_BASE_URL",
    "PDFIUM_DYNAMIC_LIB_PATH",
];

/// Stages a Pdfium shared library next to the build output and records its
/// location for runtime binding. Staging problems never fail the build: the
/// engine falls back to a library in the working directory or on the system.
fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for name in WATCHED_ENV {
        println!("cargo:rerun-if-env-changed={name}");
    }

    if env::var_os("CARGO_FEATURE_PDF").is_none()
        || env::var_os("DOCVIEW_PDFIUM_SKIP_DOWNLOAD").is_some()
        || env::var_os("PDFIUM_DYNAMIC_LIB_PATH").is_some()
    {
        return;
    }

    match Staging::from_env().and_then(|staging| staging.run()) {
        Ok(library) => match library.to_str() {
            Some(path) => println!("cargo:rustc-env={LIBRARY_ENV}={path}"),
            None => println!("cargo:warning=pdfium path {library:?} is not UTF-8"),
        },
        Err(err) => println!("cargo:warning=pdfium not staged: {err:#}"),
    }
}

struct Staging {
    root: PathBuf,
    target_os: String,
    platform: String,
}

impl Staging {
    fn from_env() -> Result<Self> {
        let out_dir = env::var("OUT_DIR").context("OUT_DIR not set")?;
        let target_os = env::var("CARGO_CFG_TARGET_OS").context("CARGO_CFG_TARGET_OS not set")?;
        let target_arch =
            env::var("CARGO_CFG_TARGET_ARCH").context("CARGO_CFG_TARGET_ARCH not set")?;
        let platform = env::var("DOCVIEW_PDFIUM_PLATFORM")
            .unwrap_or_else(|_| platform_name(&target_os, &target_arch));
        Ok(Self {
            root: PathBuf::from(out_dir).join("pdfium"),
            target_os,
            platform,
        })
    }

    fn run(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {:?}", self.root))?;
        if let Some(found) = self.find_library() {
            return Ok(found);
        }

        let archive = match env::var_os("DOCVIEW_PDFIUM_ARCHIVE") {
            Some(path) => PathBuf::from(path),
            None => self.download()?,
        };
        unpack(&archive, &self.root)?;
        self.find_library()
            .ok_or_else(|| anyhow!("no pdfium library inside {:?}", archive))
    }

    fn find_library(&self) -> Option<PathBuf> {
        let wanted = match self.target_os.as_str() {
            "windows" => "pdfium.dll",
            "macos" => "libpdfium.dylib",
            _ => "libpdfium.so",
        };
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| entry.file_name() == wanted)
            .map(|entry| entry.into_path())
    }

    fn download(&self) -> Result<PathBuf> {
        let version =
            env::var("DOCVIEW_PDFIUM_VERSION").unwrap_or_else(|_| PDFIUM_VERSION.to_owned());
        let base_url =
            env::var("DOCVIEW_PDFIUM_BASE_URL").unwrap_or_else(|_| RELEASES_URL.to_owned());
        let cache = self.root.join("downloads");
        fs::create_dir_all(&cache).with_context(|| format!("failed to create {:?}", cache))?;

        let agent = AgentBuilder::new()
            .timeout_connect(Duration::from_secs(15))
            .timeout_read(Duration::from_secs(120))
            .build();

        let mut failures = Vec::new();
        for name in [
            format!("pdfium-{}.tgz", self.platform),
            format!("pdfium-{}.zip", self.platform),
        ] {
            let target = cache.join(&name);
            if target.exists() {
                return Ok(target);
            }
            let url = format!(
                "{}/{}/{}/{}",
                base_url.trim_end_matches('/'),
                RELEASE_PREFIX,
                version,
                name
            );
            match fetch(&agent, &url, &target) {
                Ok(()) => return Ok(target),
                Err(err) => {
                    let _ = fs::remove_file(&target);
                    failures.push(format!("{err:#}"));
                }
            }
        }
        bail!(
            "download for {} failed: {}",
            self.platform,
            failures.join("; ")
        )
    }
}

fn platform_name(target_os: &str, target_arch: &str) -> String {
    let os = match target_os {
        "macos" => "mac",
        other => other,
    };
    let arch = match target_arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{os}-{arch}")
}

fn fetch(agent: &ureq::Agent, url: &str, destination: &Path) -> Result<()> {
    let response = match agent.get(url).call() {
        Ok(response) => response,
        Err(UreqError::Status(code, _)) => bail!("GET {url} returned HTTP {code}"),
        Err(err) => bail!("GET {url} failed: {err}"),
    };
    let mut file =
        File::create(destination).with_context(|| format!("failed to create {:?}", destination))?;
    io::copy(&mut response.into_reader(), &mut file)
        .with_context(|| format!("failed to write {:?}", destination))?;
    file.flush()?;
    Ok(())
}

fn unpack(archive: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive).with_context(|| format!("failed to open {:?}", archive))?;
    let extension = archive
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "tgz" | "gz" => Archive::new(GzDecoder::new(file))
            .unpack(destination)
            .with_context(|| format!("failed to unpack {:?}", archive)),
        "zip" => ZipArchive::new(file)
            .and_then(|mut zip| zip.extract(destination))
            .with_context(|| format!("failed to extract {:?}", archive)),
        other => bail!("unsupported archive type {other:?} for {:?}", archive),
    }
}
