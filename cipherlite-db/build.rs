//! Build script for cipherlite-db.
//!
//! Fetches the pinned sqlite3mc amalgamation (unless it is already cached in
//! `OUT_DIR`), checks its SHA-256 digest, unpacks the two amalgamation files
//! and compiles them into the static library the `ffi` module links against.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};

const SQLITE3MC_VERSION: &str = "2.2.7";
const SQLITE_VERSION: &str = "3.51.2";
const DOWNLOAD_URL: &str = "https://github.com/utelle/SQLite3MultipleCiphers/releases/download/v2.2.7/sqlite3mc-2.2.7-sqlite-3.51.2-amalgamation.zip";
const EXPECTED_SHA256: &str =
    "8e84aadc53bc09bda9cd307745a178191e7783e1b6478d74ffbcdf6a04f98085";

const AMALGAMATION_FILES: [&str; 2] = ["sqlite3mc_amalgamation.c", "sqlite3mc_amalgamation.h"];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR not set"));
    let source_dir = out_dir.join(format!("sqlite3mc-{SQLITE3MC_VERSION}"));

    let cached = AMALGAMATION_FILES
        .iter()
        .all(|name| source_dir.join(name).exists());
    if !cached {
        std::fs::create_dir_all(&source_dir).expect("failed to create source dir");
        let zip_path = out_dir.join("sqlite3mc-amalgamation.zip");
        download(&zip_path);
        verify_checksum(&zip_path);
        extract(&zip_path, &source_dir);
    }

    compile(&source_dir.join(AMALGAMATION_FILES[0]), &source_dir);
}

/// Downloads the pinned amalgamation zip with curl.
fn download(dest: &Path) {
    println!(
        "cargo:warning=Downloading sqlite3mc {SQLITE3MC_VERSION} (SQLite {SQLITE_VERSION})..."
    );
    let status = Command::new("curl")
        .args(["-fsSL", "-o"])
        .arg(dest)
        .arg(DOWNLOAD_URL)
        .status()
        .expect("failed to run curl -- is it installed?");
    assert!(status.success(), "curl failed with status {status}");
}

fn verify_checksum(zip_path: &Path) {
    let mut bytes = Vec::new();
    File::open(zip_path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .expect("failed to read downloaded archive");
    let actual = format!("{:x}", Sha256::digest(&bytes));
    assert_eq!(
        actual, EXPECTED_SHA256,
        "sqlite3mc checksum mismatch!\n  expected: {EXPECTED_SHA256}\n  actual:   {actual}"
    );
}

/// Copies the amalgamation source and header out of the archive, flattening
/// any directory prefix.
fn extract(zip_path: &Path, dest_dir: &Path) {
    let file = File::open(zip_path).expect("failed to open archive");
    let mut archive = zip::ZipArchive::new(file).expect("not a zip archive");

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).expect("corrupt zip entry");
        let Some(name) = Path::new(entry.name())
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
        else {
            continue;
        };
        if AMALGAMATION_FILES.contains(&name.as_str()) {
            let mut out = File::create(dest_dir.join(&name)).expect("failed to create file");
            io::copy(&mut entry, &mut out).expect("failed to extract file");
        }
    }

    for name in AMALGAMATION_FILES {
        assert!(
            dest_dir.join(name).exists(),
            "{name} not found in the sqlite3mc archive"
        );
    }
}

fn compile(amalgamation_c: &Path, include_dir: &Path) {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    let mut build = cc::Build::new();
    build
        .file(amalgamation_c)
        .include(include_dir)
        .define("SQLITE_CORE", None)
        .define("SQLITE_THREADSAFE", "1")
        .define("SQLITE_DQS", "0")
        .define("SQLITE_DEFAULT_FOREIGN_KEYS", "0")
        .define("SQLITE_DEFAULT_MEMSTATUS", "0")
        .define("SQLITE_LIKE_DOESNT_MATCH_BLOBS", None)
        .define("SQLITE_OMIT_SHARED_CACHE", None)
        // Keep temp tables and sort spills on disk, inside the directory the
        // caller hands to `Connection::open`.
        .define("SQLITE_TEMP_STORE", "1")
        // Default cipher for passphrase and raw keys.
        .define("CODEC_TYPE", "CODEC_TYPE_CHACHA20")
        .define("ARGON2_NO_THREADS", None);

    if matches!(target_os.as_str(), "android" | "ios" | "macos" | "linux") {
        build.define("HAVE_USLEEP", "1");
        build.define("HAVE_LOCALTIME_R", "1");
    }

    build.warnings(false);
    build.compile("sqlite3mc");
}
