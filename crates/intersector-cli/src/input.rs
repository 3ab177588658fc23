use anyhow::Context;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Lines of one input file, read on demand by the worker that owns it.
///
/// Read errors carry the file path so a failure report names its input.
pub struct FileLines {
    path: PathBuf,
    lines: io::Lines<BufReader<File>>,
}

impl FileLines {
    /// Opens `path` up front so a missing file fails before any worker starts.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
        })
    }
}

impl Iterator for FileLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.next()?;
        Some(line.map_err(|err| {
            io::Error::new(err.kind(), format!("{}: {err}", self.path.display()))
        }))
    }
}

pub fn open_all(paths: &[PathBuf]) -> anyhow::Result<Vec<FileLines>> {
    paths.iter().map(|path| FileLines::open(path)).collect()
}
