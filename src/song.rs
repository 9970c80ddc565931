//! Songs and their backing containers.
//!
//! A [`Song`] bundles the charts that share one resource set. The backing
//! store is abstracted as a [`Directory`], a key to bytes mapping, so
//! archive backends can be slotted in from outside; the crate ships the
//! plain folder implementation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bms::{self, LoadOptions, LoadWarning};
use crate::chart::Chart;
use crate::vos;

/// Recognized chart source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SongType {
    /// BMS family (.bms/.bme/.bml/.pms).
    Bms,
    /// BMSON.
    Bmson,
    /// osu! beatmap.
    Osu,
    /// VOS v2/v3.
    Vos,
    /// Stepmania simfile.
    Sm,
    /// DTXMania chart.
    Dtx,
    /// O2Jam music archive.
    Ojm,
}

impl SongType {
    /// Detects the format from a file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "bms" | "bme" | "bml" | "pms" => Some(Self::Bms),
            "bmson" => Some(Self::Bmson),
            "osu" => Some(Self::Osu),
            "vos" => Some(Self::Vos),
            "sm" => Some(Self::Sm),
            "dtx" => Some(Self::Dtx),
            "ojm" => Some(Self::Ojm),
            _ => None,
        }
    }

    /// Whether this crate can load the format.
    #[must_use]
    pub const fn loadable(self) -> bool {
        matches!(self, Self::Bms | Self::Vos)
    }
}

/// A failure at the song boundary.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SongError {
    /// No loader accepts the source.
    #[error("no loader recognizes `{0}`")]
    Unrecognized(PathBuf),
    /// The backing store failed.
    #[error("container error: {0}")]
    Io(#[from] io::Error),
    /// The format has no writer.
    #[error("saving {0:?} charts is not supported")]
    UnsupportedSave(SongType),
    /// The VOS structure was damaged.
    #[error(transparent)]
    Vos(#[from] vos::VosError),
}

/// A key → bytes store backing a song.
pub trait Directory {
    /// Lists the entry names.
    fn list(&self) -> io::Result<Vec<String>>;
    /// Reads one entry.
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;
    /// Writes one entry.
    fn write(&mut self, name: &str, bytes: &[u8]) -> io::Result<()>;
    /// Whether [`Directory::write`] can succeed at all.
    fn is_writable(&self) -> bool;
}

/// A [`Directory`] backed by a plain filesystem folder.
#[derive(Debug, Clone)]
pub struct FolderDirectory {
    root: PathBuf,
}

impl FolderDirectory {
    /// Opens `root` as a container. The folder must exist.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// The folder path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Directory for FolderDirectory {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(name))
    }

    fn write(&mut self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::write(self.root.join(name), bytes)
    }

    fn is_writable(&self) -> bool {
        !self.root.metadata().map(|m| m.permissions().readonly()).unwrap_or(true)
    }
}

/// The charts sharing one container.
pub struct Song {
    directory: Box<dyn Directory>,
    charts: Vec<Chart>,
    song_type: SongType,
    warnings: Vec<LoadWarning>,
}

impl Song {
    /// Opens a song from a chart file or a folder of chart files.
    ///
    /// A folder loads every recognizable chart entry; a file loads that
    /// entry from its parent folder.
    pub fn open(path: &Path, options: &LoadOptions) -> Result<Self, SongError> {
        if path.is_dir() {
            let directory = FolderDirectory::open(path)?;
            Self::from_directory(Box::new(directory), None, options, path)
        } else {
            let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
            let directory = FolderDirectory::open(parent.unwrap_or(Path::new(".")))?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| SongError::Unrecognized(path.to_path_buf()))?;
            Self::from_directory(Box::new(directory), Some(name.to_owned()), options, path)
        }
    }

    /// Opens a song from an arbitrary container. With `only` set just that
    /// entry is loaded.
    pub fn from_directory(
        directory: Box<dyn Directory>,
        only: Option<String>,
        options: &LoadOptions,
        origin: &Path,
    ) -> Result<Self, SongError> {
        let names = match &only {
            Some(name) => vec![name.clone()],
            None => directory.list()?,
        };

        let mut charts = Vec::new();
        let mut warnings = Vec::new();
        let mut song_type = None;
        for name in names {
            let Some(kind) = SongType::from_path(Path::new(&name)) else {
                continue;
            };
            if !kind.loadable() {
                continue;
            }
            let bytes = directory.read(&name)?;
            let mut chart = match kind {
                SongType::Bms => {
                    let mut output = bms::load(&bytes, options);
                    warnings.append(&mut output.warnings);
                    output.chart
                }
                SongType::Vos => vos::load(&bytes)?.chart,
                _ => continue,
            };
            chart.set_filename(name);
            charts.push(chart);
            song_type.get_or_insert(kind);
        }

        let Some(song_type) = song_type else {
            return Err(SongError::Unrecognized(origin.to_path_buf()));
        };
        Ok(Self {
            directory,
            charts,
            song_type,
            warnings,
        })
    }

    /// The detected source format.
    #[must_use]
    pub const fn song_type(&self) -> SongType {
        self.song_type
    }

    /// The loaded charts.
    #[must_use]
    pub fn charts(&self) -> &[Chart] {
        &self.charts
    }

    /// Mutable access to the loaded charts.
    pub fn charts_mut(&mut self) -> &mut [Chart] {
        &mut self.charts
    }

    /// Diagnostics collected while loading.
    #[must_use]
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// Writes every chart back into the container.
    ///
    /// Only the BMS writer exists; other formats fail with
    /// [`SongError::UnsupportedSave`]. Charts are never altered by a
    /// failed save.
    pub fn save(&mut self) -> Result<(), SongError> {
        if self.song_type != SongType::Bms {
            return Err(SongError::UnsupportedSave(self.song_type));
        }
        let mut pending = Vec::with_capacity(self.charts.len());
        for chart in &self.charts {
            let Some(name) = chart.filename() else {
                continue;
            };
            pending.push((name.to_owned(), bms::write_chart(chart)));
        }
        for (name, text) in pending {
            self.directory.write(&name, text.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn song_type_detection() {
        assert_eq!(
            SongType::from_path(Path::new("song/foo.BME")),
            Some(SongType::Bms)
        );
        assert_eq!(
            SongType::from_path(Path::new("a.vos")),
            Some(SongType::Vos)
        );
        assert_eq!(SongType::from_path(Path::new("readme.txt")), None);
        assert!(SongType::Bms.loadable());
        assert!(!SongType::Osu.loadable());
    }
}
