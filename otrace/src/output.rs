//! Flush orchestration: snapshot, serialize, place the file.
//!
//! Every flush serializes to `<final>.tmp` first. The tmp file is then
//! either gzip-streamed to the final name, or moved over it atomically with
//! a copy-and-unlink fallback. A failed flush removes the tmp file, leaves
//! any previous output intact, and restores emission.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use crate::registry::{registry, PauseEmission};
use crate::{collect, synth, writer};

/// Where flushes go; swapped whole on reconfiguration.
#[derive(Clone)]
pub(crate) struct OutputConfig {
    pub(crate) path: PathBuf,
    /// Rotation pattern with an optional printf-style `%u`/`%d` field.
    pub(crate) pattern: Option<String>,
    /// Advisory only; documents are never split.
    #[allow(dead_code)]
    pub(crate) max_size_mb: u32,
    pub(crate) max_files: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            path: PathBuf::from("trace.json"),
            pattern: None,
            max_size_mb: 0,
            max_files: 1,
        }
    }
}

/// Writes the current timeline. `path` overrides the configured output for
/// this flush only; with a rotation pattern configured and no override,
/// each successful flush advances the rotation index.
///
/// Emission is paused for the duration and restored on every exit path.
/// Failures are logged and swallowed; the caller never sees them.
pub fn flush(path: Option<&Path>) {
    let reg = registry();
    let _serialize = reg.flush_gate.lock();
    let _pause = PauseEmission::new(reg);

    let mut events = collect::collect(reg);
    collect::sort_snapshot(&mut events);

    if reg.synth_enabled() {
        let cfg = reg.synth.load_full();
        let extra = synth::synthesize(&events, &cfg, reg.refresh_pid());
        if !extra.is_empty() {
            events.extend(extra);
            collect::sort_snapshot(&mut events);
        }
    }

    let output = reg.output.load_full();
    let (target, rotated) = match path {
        Some(p) => (p.to_path_buf(), false),
        None => match &output.pattern {
            Some(pattern) => {
                let max_files = output.max_files.max(1);
                let index = reg.rotation_index.load(Ordering::Relaxed) % max_files;
                (PathBuf::from(render_pattern(pattern, index)), true)
            }
            None => (output.path.clone(), false),
        },
    };

    match write_snapshot(&target, &events) {
        Ok(written) => {
            if rotated {
                reg.rotation_index.fetch_add(1, Ordering::Relaxed);
            }
            tracing::debug!(path = %written.display(), events = events.len(), "trace flushed");
        }
        Err(err) => {
            tracing::warn!(path = %target.display(), error = %err, "flush abandoned");
        }
    }
}

fn write_snapshot(target: &Path, events: &[collect::CleanEvent]) -> crate::Result<PathBuf> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::debug!(dir = %parent.display(), error = %err, "directory creation failed");
            }
        }
    }

    let tmp = tmp_path(target);
    let serialized = (|| -> crate::Result<()> {
        let file = File::create(&tmp)?;
        let mut buffered = BufWriter::new(file);
        writer::write_document(&mut buffered, events)?;
        Ok(())
    })();
    if let Err(err) = serialized {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    finalize(&tmp, target)
}

fn finalize(tmp: &Path, target: &Path) -> crate::Result<PathBuf> {
    if target.extension().is_some_and(|ext| ext == "gz") {
        #[cfg(feature = "gzip")]
        {
            let compressed = gzip_file(tmp, target);
            let _ = fs::remove_file(tmp);
            return compressed.map(|_| target.to_path_buf());
        }
        #[cfg(not(feature = "gzip"))]
        {
            let plain = target.with_extension("");
            tracing::warn!(
                path = %target.display(),
                "gzip requested without a backend; writing plain JSON"
            );
            return replace_file(tmp, &plain).map(|_| plain);
        }
    }
    replace_file(tmp, target).map(|_| target.to_path_buf())
}

fn replace_file(tmp: &Path, target: &Path) -> crate::Result<()> {
    if fs::rename(tmp, target).is_ok() {
        return Ok(());
    }
    tracing::warn!(path = %target.display(), "rename failed; copying instead");
    let copied = fs::copy(tmp, target);
    let _ = fs::remove_file(tmp);
    copied.map(|_| ()).map_err(Into::into)
}

#[cfg(feature = "gzip")]
fn gzip_file(tmp: &Path, target: &Path) -> crate::Result<()> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let compress = || -> crate::Result<()> {
        let mut input = File::open(tmp)?;
        let output = File::create(target)?;
        let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
        std::io::copy(&mut input, &mut encoder)?;
        let mut inner = encoder.finish()?;
        inner.flush()?;
        Ok(())
    };
    if let Err(err) = compress() {
        let _ = fs::remove_file(target);
        return Err(err);
    }
    Ok(())
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Substitutes the rotation index into the first printf-style unsigned
/// field of the pattern (`%u`/`%d`, zero flag and width honored, `%%`
/// escapes a percent). Without a field the index is appended as `-NNNNNN`.
pub(crate) fn render_pattern(pattern: &str, index: u32) -> String {
    let bytes = pattern.as_bytes();
    let mut search = 0;
    while let Some(offset) = pattern[search..].find('%') {
        let start = search + offset;
        let mut cursor = start + 1;
        if bytes.get(cursor) == Some(&b'%') {
            search = cursor + 1;
            continue;
        }
        let mut zero = false;
        while matches!(bytes.get(cursor), Some(b'-' | b'+' | b' ' | b'#' | b'0')) {
            if bytes[cursor] == b'0' {
                zero = true;
            }
            cursor += 1;
        }
        let width_start = cursor;
        while matches!(bytes.get(cursor), Some(b'0'..=b'9')) {
            cursor += 1;
        }
        let width: usize = pattern[width_start..cursor].parse().unwrap_or(0);
        if matches!(bytes.get(cursor), Some(b'd' | b'u')) {
            let rendered = if zero {
                format!("{index:0width$}")
            } else {
                format!("{index:width$}")
            };
            let mut out = String::with_capacity(pattern.len() + rendered.len());
            out.push_str(&pattern[..start]);
            out.push_str(&rendered);
            out.push_str(&pattern[cursor + 1..]);
            return out;
        }
        search = start + 1;
    }
    format!("{pattern}-{index:06}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("traces/run-%03u.json", 7, "traces/run-007.json")]
    #[case("traces/run-%03u.json", 123, "traces/run-123.json")]
    #[case("run-%u.json", 5, "run-5.json")]
    #[case("run-%d.json.gz", 0, "run-0.json.gz")]
    #[case("100%%-%02u.json", 3, "100%-03.json")]
    #[case("trace.json", 1, "trace.json-000001")]
    fn pattern_rendering(#[case] pattern: &str, #[case] index: u32, #[case] expected: &str) {
        assert_eq!(render_pattern(pattern, index), expected);
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("traces/run-000.json")),
            Path::new("traces/run-000.json.tmp")
        );
    }

    #[test]
    fn snapshot_lands_at_target_with_parents_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("nested/out.json");
        let written = write_snapshot(&target, &[]).unwrap();
        assert_eq!(written, target);
        assert!(target.is_file());
        assert!(!tmp_path(&target).exists());
    }

    #[cfg(not(feature = "gzip"))]
    #[test]
    fn gz_suffix_is_stripped_without_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("out.json.gz");
        let written = write_snapshot(&target, &[]).unwrap();
        assert_eq!(written, dir.path().join("out.json"));
        assert!(!target.exists());
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gz_suffix_produces_gzip_magic() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("out.json.gz");
        let written = write_snapshot(&target, &[]).unwrap();
        assert_eq!(written, target);
        let bytes = fs::read(&target).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert!(!tmp_path(&target).exists());
    }
}
