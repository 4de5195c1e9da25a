//! # Script Writer
//!
//! Streams generated commands into shell scripts: either one script (stdout or
//! a file) or a directory of numbered scripts holding `N` commands each.
//! Commands are pulled from the generator one at a time, so only the current
//! chunk is ever held in memory.

use crate::core::errors::GenerateError;
use lazy_static::lazy_static;
use regex::Regex;
use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
use thiserror::Error;

lazy_static! {
    // `{{`, `}}`, a replacement field, or a stray brace.
    static ref FIELD_RE: Regex = Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").unwrap();
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write to stdout: {0}")]
    Stdout(#[source] io::Error),
    #[error("Invalid preamble format: {0}")]
    Format(String),
    #[error("Could not expand path '{path}': {message}")]
    Expand { path: String, message: String },
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

/// How `--outdir` scripts are named and filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLayout {
    /// File stem; files are `<name>-<index>.sh`.
    pub name: String,
    /// Zero-padding width of the index.
    pub digit: usize,
    /// Commands per script.
    pub per_script: NonZeroUsize,
}

impl ChunkLayout {
    pub fn padded_index(&self, index: usize) -> String {
        format!("{:0width$}", index, width = self.digit)
    }

    pub fn file_name(&self, index: usize) -> String {
        format!(
            "{}-{}.{}",
            self.name,
            self.padded_index(index),
            crate::constants::SCRIPT_EXTENSION
        )
    }
}

// --- CHUNKING ---

/// Groups an iterator into `Vec`s of at most `size` items, lazily.
#[derive(Debug, Clone)]
pub struct Chunks<I> {
    inner: I,
    size: NonZeroUsize,
}

impl<I: Iterator> Iterator for Chunks<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<I::Item> = self.inner.by_ref().take(self.size.get()).collect();
        if chunk.is_empty() { None } else { Some(chunk) }
    }
}

pub fn chunks<I: IntoIterator>(iter: I, size: NonZeroUsize) -> Chunks<I::IntoIter> {
    Chunks {
        inner: iter.into_iter(),
        size,
    }
}

// --- PREAMBLE ---

/// Fills the replacement fields of a preamble: `{}`/`{0}` is the padded index,
/// `{1}` the name. `{{` and `}}` are literal braces.
pub fn format_preamble(template: &str, index: &str, name: &str) -> Result<String, WriteError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    let mut next_auto = 0usize;
    let mut numbering: Option<bool> = None; // Some(true) = automatic

    for caps in FIELD_RE.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(template.get(last..whole.start()).unwrap_or_default());
        last = whole.end();

        match whole.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            "{" => return Err(WriteError::Format("single '{' encountered".to_string())),
            "}" => return Err(WriteError::Format("single '}' encountered".to_string())),
            _ => {
                let field = caps.get(1).map_or("", |f| f.as_str());
                let automatic = field.is_empty();
                if numbering.is_some_and(|auto| auto != automatic) {
                    return Err(WriteError::Format(
                        "cannot mix automatic and manual field numbering".to_string(),
                    ));
                }
                numbering = Some(automatic);

                let position = if automatic {
                    next_auto += 1;
                    next_auto - 1
                } else {
                    field
                        .parse::<usize>()
                        .map_err(|_| WriteError::Format(format!("unsupported field '{{{}}}'", field)))?
                };
                match position {
                    0 => out.push_str(index),
                    1 => out.push_str(name),
                    n => {
                        return Err(WriteError::Format(format!(
                            "field {} is out of range (only {{0}} and {{1}} are available)",
                            n
                        )));
                    }
                }
            }
        }
    }
    out.push_str(template.get(last..).unwrap_or_default());
    Ok(out)
}

// --- OUTPUT ---

/// Writes `preamble`, a newline, the commands joined by newlines and a final
/// newline. Returns the number of commands written.
pub fn write_script<W, I>(out: &mut W, preamble: &str, commands: I) -> Result<usize, WriteError>
where
    W: Write,
    I: IntoIterator<Item = Result<String, GenerateError>>,
{
    let io_err = WriteError::Stdout;
    out.write_all(preamble.as_bytes()).map_err(io_err)?;
    out.write_all(b"\n").map_err(io_err)?;
    let mut count = 0;
    for command in commands {
        let command = command?;
        if count > 0 {
            out.write_all(b"\n").map_err(io_err)?;
        }
        out.write_all(command.as_bytes()).map_err(io_err)?;
        count += 1;
    }
    out.write_all(b"\n").map_err(io_err)?;
    out.flush().map_err(io_err)?;
    Ok(count)
}

/// Writes the script to stdout.
pub fn write_stdout<I>(preamble: &str, commands: I) -> Result<usize, WriteError>
where
    I: IntoIterator<Item = Result<String, GenerateError>>,
{
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    write_script(&mut out, preamble, commands)
}

/// Writes the script to `path` and makes it executable.
pub fn write_file<I>(path: &Path, preamble: &str, commands: I) -> Result<usize, WriteError>
where
    I: IntoIterator<Item = Result<String, GenerateError>>,
{
    let with_path = |source: io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(with_path)?;
    let mut out = BufWriter::new(file);
    let count = write_script(&mut out, preamble, commands).map_err(|e| match e {
        WriteError::Stdout(source) => with_path(source),
        other => other,
    })?;
    drop(out);
    make_executable(path).map_err(with_path)?;
    log::info!("Wrote {} command(s) to {}", count, path.display());
    Ok(count)
}

/// Writes one script per chunk of `layout.per_script` commands into `outdir`,
/// creating it if needed. Returns the paths written, in order.
///
/// An error from the generator stops the run; scripts already written are kept.
pub fn write_chunks<I>(
    outdir: &Path,
    layout: &ChunkLayout,
    preamble: &str,
    commands: I,
) -> Result<Vec<PathBuf>, WriteError>
where
    I: IntoIterator<Item = Result<String, GenerateError>>,
{
    // Surface a bad template before anything touches the disk.
    format_preamble(preamble, &layout.padded_index(0), &layout.name)?;

    fs::create_dir_all(outdir).map_err(|source| WriteError::Io {
        path: outdir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for (index, chunk) in chunks(commands, layout.per_script).enumerate() {
        let chunk = chunk.into_iter().collect::<Result<Vec<String>, _>>()?;
        let padded = layout.padded_index(index);
        let path = outdir.join(layout.file_name(index));
        let content = format!(
            "{}\n{}\n",
            format_preamble(preamble, &padded, &layout.name)?,
            chunk.join("\n")
        );

        let with_path = |source: io::Error| WriteError::Io {
            path: path.clone(),
            source,
        };
        fs::write(&path, content).map_err(with_path)?;
        make_executable(&path).map_err(with_path)?;
        log::info!("Wrote {} command(s) to {}", chunk.len(), path.display());
        written.push(path);
    }

    if written.is_empty() {
        log::warn!("No commands were generated; nothing written to {}", outdir.display());
    }
    Ok(written)
}

/// Expands `~` and environment variables in a user supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf, WriteError> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| WriteError::Expand {
            path: raw.to_string(),
            message: e.to_string(),
        })
}

/// Copies every read bit to the matching execute bit.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    permissions.set_mode(mode | ((mode & 0o444) >> 2));
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ok(commands: &[&str]) -> Vec<Result<String, GenerateError>> {
        commands.iter().map(|c| Ok(c.to_string())).collect()
    }

    fn layout(per_script: usize) -> ChunkLayout {
        ChunkLayout {
            name: "job".to_string(),
            digit: 4,
            per_script: NonZeroUsize::new(per_script).unwrap(),
        }
    }

    #[test]
    fn test_chunk_count_is_ceiling_division() {
        for len in 0..12usize {
            for size in 1..5usize {
                let got: Vec<Vec<usize>> = chunks(0..len, NonZeroUsize::new(size).unwrap()).collect();
                assert_eq!(got.len(), len.div_ceil(size), "len={} size={}", len, size);
                assert!(got.iter().all(|c| !c.is_empty() && c.len() <= size));
                let flat: Vec<usize> = got.into_iter().flatten().collect();
                assert_eq!(flat, (0..len).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_format_preamble() {
        assert_eq!(format_preamble("#!/bin/bash", "0001", "job").unwrap(), "#!/bin/bash");
        assert_eq!(
            format_preamble("#SBATCH -J {1}-{0}", "0001", "job").unwrap(),
            "#SBATCH -J job-0001"
        );
        assert_eq!(format_preamble("{}/{}", "0002", "run").unwrap(), "0002/run");
        assert_eq!(format_preamble("f() {{ :; }}", "0", "x").unwrap(), "f() { :; }");
    }

    #[test]
    fn test_format_preamble_errors() {
        for bad in ["{2}", "{name}", "{", "}", "{0} {}"] {
            let err = format_preamble(bad, "0000", "job").unwrap_err();
            assert!(matches!(err, WriteError::Format(_)), "{}: {:?}", bad, err);
        }
    }

    #[test]
    fn test_write_script_layout() {
        let mut out = Vec::new();
        let count = write_script(&mut out, "#!/bin/sh", ok(&["a 1", "a 2"])).unwrap();
        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "#!/bin/sh\na 1\na 2\n");

        let mut out = Vec::new();
        write_script(&mut out, "", ok(&[])).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\n\n");
    }

    #[test]
    fn test_write_chunks_names_and_contents() {
        let dir = tempdir().unwrap();
        let outdir = dir.path().join("nested").join("scripts");
        let paths = write_chunks(&outdir, &layout(2), "# {0} {1}", ok(&["c1", "c2", "c3"])).unwrap();

        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["job-0000.sh", "job-0001.sh"]);
        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), "# 0000 job\nc1\nc2\n");
        assert_eq!(fs::read_to_string(&paths[1]).unwrap(), "# 0001 job\nc3\n");
    }

    #[test]
    fn test_write_chunks_without_commands_writes_nothing() {
        let dir = tempdir().unwrap();
        let paths = write_chunks(dir.path(), &layout(1), "", ok(&[])).unwrap();
        assert!(paths.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_generator_error_keeps_earlier_scripts() {
        let dir = tempdir().unwrap();
        let commands = vec![
            Ok("c1".to_string()),
            Err(GenerateError::UnknownMode {
                mode: "x".to_string(),
                referenced_by: None,
            }),
        ];
        let err = write_chunks(dir.path(), &layout(1), "", commands).unwrap_err();
        assert!(matches!(err, WriteError::Generate(_)));
        assert!(dir.path().join("job-0000.sh").is_file());
        assert!(!dir.path().join("job-0001.sh").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_written_file_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("run.sh");
        write_file(&path, "#!/bin/sh", ok(&["true"])).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o100, 0o100);
        assert_eq!((mode & 0o444) >> 2, mode & 0o111);
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("plain/dir").unwrap(), PathBuf::from("plain/dir"));
        let err = expand_path("$YAML2CLI_SURELY_UNSET_VARIABLE/x").unwrap_err();
        assert!(matches!(err, WriteError::Expand { .. }));
    }
}
