//! A result cache keyed by file signatures.
//!
//! Expensive steps (sampling, whole-file alignment) key their output on a
//! digest of everything that went into it: a tag naming the step, the
//! contents of the input files, and the numeric parameters. An entry is a
//! directory named by the key digest; a small completion record written
//! after a successful build distinguishes finished entries from the debris
//! of an interrupted one.

use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use culpa::throws;
use tracing::debug;
use twox_hash::XxHash64;

const COMPLETION_RECORD: &str = "complete";

/// What a file's contents looked like when the signature was taken.
#[derive(Clone, Debug)]
pub struct FileSignature {
    pub path: PathBuf,
    pub len: u64,
    pub digest: u64,
}

/// Digest a file's contents.
#[throws(io::Error)]
pub fn file_signature(path: impl AsRef<Path>) -> FileSignature {
    let path = path.as_ref().to_path_buf();
    let mut file = File::open(&path)?;
    let mut hasher = XxHash64::with_seed(0);
    let mut buf = [0u8; 64 * 1024];
    let mut len = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.write(&buf[..n]);
        len += n as u64;
    }
    FileSignature { path, len, digest: hasher.finish() }
}

/// Accumulates the identity of a cached result.
///
/// Each part is written length-prefixed so adjacent parts cannot run into
/// each other.
pub struct CacheKey {
    hasher: XxHash64,
}

impl CacheKey {
    pub fn new(tag: &str) -> Self {
        let mut key = CacheKey { hasher: XxHash64::with_seed(0) };
        key.push_bytes(tag.as_bytes());
        key
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.hasher.write_u64(bytes.len() as u64);
        self.hasher.write(bytes);
    }

    pub fn text(mut self, text: &str) -> Self {
        self.push_bytes(text.as_bytes());
        self
    }

    pub fn number(mut self, number: u64) -> Self {
        self.hasher.write_u64(number);
        self
    }

    pub fn file(self, signature: &FileSignature) -> Self {
        self.text(&signature.path.to_string_lossy())
            .number(signature.len)
            .number(signature.digest)
    }

    pub fn digest(&self) -> u64 {
        self.hasher.finish()
    }
}

/// The cache root: `$SHOAL_CACHE`, or `.shoal-cache` in the working
/// directory.
pub fn default_root() -> PathBuf {
    std::env::var_os("SHOAL_CACHE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".shoal-cache"))
}

/// Return the directory holding the result for `key`, running `build`
/// into it first if no finished entry exists.
///
/// `build` receives a scratch directory; the entry only becomes visible
/// (and reusable) once it returns successfully and the completion record
/// is in place.
pub fn get<E, F>(root: &Path, key: &CacheKey, build: F) -> Result<PathBuf, E>
where
    E: From<io::Error>,
    F: FnOnce(&Path) -> Result<(), E>,
{
    let digest = key.digest();
    let entry = root.join(format!("{:016x}", digest));

    if let Ok(mut record) = File::open(entry.join(COMPLETION_RECORD)) {
        if record.read_u64::<LE>().map(|stored| stored == digest).unwrap_or(false) {
            debug!(entry = %entry.display(), "cache hit");
            return Ok(entry);
        }
        // truncated or foreign record: rebuild from scratch
        fs::remove_dir_all(&entry)?;
    }

    let scratch = root.join(format!("{:016x}.partial", digest));
    if scratch.exists() {
        fs::remove_dir_all(&scratch)?;
    }
    fs::create_dir_all(&scratch)?;

    debug!(entry = %entry.display(), "cache miss, building");
    build(&scratch)?;

    let mut record = File::create(scratch.join(COMPLETION_RECORD))?;
    record.write_u64::<LE>(digest)?;
    if entry.exists() {
        fs::remove_dir_all(&entry)?;
    }
    fs::rename(&scratch, &entry)?;
    Ok(entry)
}
