//! File discovery for a load
//!
//! Collects the explicit `load_files` entries and every file found directly
//! under the directories a `folder_tmpl` expands to, classifies each by name
//! and keeps the kinds the load flags ask for.

use crate::config::{LoadFlags, LoadSpec};
use crate::models::{FileFamily, FileKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A loadable input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub kind: FileKind,
}

/// Files selected for a load
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    /// Candidates skipped with a warning
    pub skipped: usize,
}

#[derive(Debug)]
pub struct FileDiscovery {
    explicit: Vec<PathBuf>,
    directories: Vec<PathBuf>,
    flags: LoadFlags,
}

impl FileDiscovery {
    pub fn from_spec(spec: &LoadSpec) -> Self {
        let directories = spec
            .folder_template
            .as_ref()
            .map(|template| template.expand())
            .unwrap_or_default();
        Self {
            explicit: spec.load_files.clone(),
            directories,
            flags: spec.flags.clone(),
        }
    }

    /// Candidate paths in discovery order, without duplicates
    fn candidates(&self) -> (Vec<PathBuf>, usize) {
        let mut skipped = 0;
        let mut paths = self.explicit.clone();

        for dir in &self.directories {
            if !dir.is_dir() {
                warn!("Skipping folder {}: not a directory", dir.display());
                skipped += 1;
                continue;
            }
            let listed: Vec<PathBuf> = WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            debug!("Found {} files in {}", listed.len(), dir.display());
            paths.extend(listed);
        }

        let mut seen = HashSet::new();
        paths.retain(|p| seen.insert(p.clone()));
        (paths, skipped)
    }

    /// Classify and filter the candidate files
    pub fn discover(&self) -> Discovery {
        let (candidates, mut skipped) = self.candidates();
        let mut files = Vec::with_capacity(candidates.len());

        for path in candidates {
            if !path.is_file() {
                warn!("Skipping {}: file not found", path.display());
                skipped += 1;
                continue;
            }
            let Some(kind) = FileKind::classify(&path) else {
                warn!("Skipping {}: unrecognized file type", path.display());
                skipped += 1;
                continue;
            };
            if !self.wanted(kind) {
                debug!("Not loading {} ({:?})", path.display(), kind);
                continue;
            }
            files.push(DiscoveredFile { path, kind });
        }

        info!(
            "Discovered {} files to load ({} skipped)",
            files.len(),
            skipped
        );
        Discovery { files, skipped }
    }

    fn wanted(&self, kind: FileKind) -> bool {
        match kind.family() {
            FileFamily::Stat | FileFamily::Vsdb | FileFamily::Tcst => self.flags.load_stat,
            FileFamily::Mode => self.flags.load_mode,
            FileFamily::Mtd => self.flags.load_mtd,
        }
    }
}

/// Modification time of a file, if the filesystem reports one
pub fn modified_time(path: &Path) -> Option<chrono::NaiveDateTime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(chrono::DateTime::<chrono::Local>::from(modified).naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionSpec, FolderTemplate};
    use std::fs;
    use tempfile::TempDir;

    fn spec() -> LoadSpec {
        LoadSpec::new(ConnectionSpec::new("localhost", "mv_test", "user", "pw").unwrap())
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "VERSION\n").unwrap();
        path
    }

    #[test]
    fn test_template_listing_and_classification() {
        let temp_dir = TempDir::new().unwrap();
        let day = temp_dir.path().join("20120409");
        fs::create_dir_all(&day).unwrap();
        touch(&day, "point_stat_120000L.stat");
        touch(&day, "mode_120000L_obj.txt");
        touch(&day, "notes.md");

        let template = FolderTemplate::new(
            &format!("{}/{{day}}", temp_dir.path().display()),
            vec![("day".into(), vec!["20120409".into(), "20120410".into()])],
        )
        .unwrap();
        let mut spec = spec();
        spec.folder_template = Some(template);

        let discovery = FileDiscovery::from_spec(&spec).discover();
        let kinds: Vec<_> = discovery.files.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FileKind::ModeObj, FileKind::Stat]);
        // the missing second folder and notes.md
        assert_eq!(discovery.skipped, 2);
    }

    #[test]
    fn test_flags_filter_families_and_duplicates_collapse() {
        let temp_dir = TempDir::new().unwrap();
        let stat = touch(temp_dir.path(), "a.stat");
        let mtd = touch(temp_dir.path(), "mtd_2d.txt");
        let missing = temp_dir.path().join("gone.stat");

        let mut spec = spec().with_files(vec![stat.clone(), mtd, stat.clone(), missing]);
        spec.flags.load_mtd = false;

        let discovery = FileDiscovery::from_spec(&spec).discover();
        assert_eq!(
            discovery.files,
            vec![DiscoveredFile {
                path: stat,
                kind: FileKind::Stat
            }]
        );
        assert_eq!(discovery.skipped, 1);
    }
}
