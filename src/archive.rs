//! Deployment package construction.
//!
//! Walks the application source tree, skipping directories and file names
//! that must never ship (dependency trees, version control metadata,
//! operator tooling), and writes the survivors into one deflate-compressed
//! zip archive with entry names relative to the source root. The zip
//! format is fixed because the remote unpack step runs `unzip -o`.

use std::fs::File;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Directory names excluded from every deployment package.
pub const EXCLUDED_DIR_NAMES: &[&str] = &["node_modules", ".git", "scripts", ".cursor"];

/// File-name globs excluded from every deployment package.
pub const EXCLUDED_FILE_GLOBS: &[&str] = &["*.py", "*.zip"];

/// Errors raised while building a deployment package.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Raised when the source directory does not exist.
    #[error("package source directory missing: {path}")]
    MissingSource {
        /// Path that was expected to hold the application.
        path: Utf8PathBuf,
    },
    /// Raised when an exclusion glob fails to compile.
    #[error("invalid exclusion pattern {pattern}: {message}")]
    Pattern {
        /// The offending glob pattern.
        pattern: String,
        /// Parser error description.
        message: String,
    },
    /// Raised when the filesystem walk fails.
    #[error("failed to walk {path}: {message}")]
    Walk {
        /// Directory or file the walk stopped at.
        path: Utf8PathBuf,
        /// Operating system error description.
        message: String,
    },
    /// Raised when reading a source file or writing the archive fails.
    #[error("failed to write the package at {path}: {message}")]
    Io {
        /// Archive or source file involved in the failure.
        path: Utf8PathBuf,
        /// Underlying error description.
        message: String,
    },
    /// Raised when the tree contains a path that is not valid UTF-8.
    #[error("package would contain a non UTF-8 path under {root}")]
    NonUtf8Path {
        /// Source root being packaged.
        root: Utf8PathBuf,
    },
}

/// Summary of a built package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiveSummary {
    /// Where the archive was written.
    pub path: Utf8PathBuf,
    /// Number of files included.
    pub file_count: usize,
}

/// Builds deployment packages with a fixed exclusion set.
#[derive(Clone, Debug)]
pub struct ArchiveBuilder {
    excluded_dirs: Vec<String>,
    excluded_globs: Vec<String>,
    excluded_names: Vec<String>,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    /// Creates a builder with the default exclusion set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            excluded_dirs: EXCLUDED_DIR_NAMES.iter().map(|name| (*name).to_owned()).collect(),
            excluded_globs: EXCLUDED_FILE_GLOBS.iter().map(|glob| (*glob).to_owned()).collect(),
            excluded_names: Vec::new(),
        }
    }

    /// Excludes an exact file name in addition to the default set. Used
    /// for the rewrite-rule source (uploaded separately, never packaged)
    /// and the archive's own output name.
    #[must_use]
    pub fn exclude_name(mut self, name: impl Into<String>) -> Self {
        self.excluded_names.push(name.into());
        self
    }

    /// Walks `root` and writes the package to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::MissingSource`] when `root` is not a
    /// directory, [`ArchiveError::Pattern`] when an exclusion glob is
    /// malformed, and [`ArchiveError::Walk`] or [`ArchiveError::Io`] for
    /// filesystem failures.
    pub fn build(&self, root: &Utf8Path, output: &Utf8Path) -> Result<ArchiveSummary, ArchiveError> {
        if !root.is_dir() {
            return Err(ArchiveError::MissingSource {
                path: root.to_path_buf(),
            });
        }

        let globs = self.compile_globs()?;
        let file = File::create(output).map_err(|err| ArchiveError::Io {
            path: output.to_path_buf(),
            message: err.to_string(),
        })?;
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut file_count = 0;
        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded_dir(entry));
        for walked in walker {
            let entry = walked.map_err(|err| ArchiveError::Walk {
                path: err
                    .path()
                    .and_then(Utf8Path::from_path)
                    .map_or_else(|| root.to_path_buf(), Utf8Path::to_path_buf),
                message: err.to_string(),
            })?;
            if !entry.file_type().is_file() || self.is_excluded_file(&entry, &globs) {
                continue;
            }

            let entry_path =
                Utf8Path::from_path(entry.path()).ok_or_else(|| ArchiveError::NonUtf8Path {
                    root: root.to_path_buf(),
                })?;
            let relative = entry_path
                .strip_prefix(root)
                .map_err(|err| ArchiveError::Walk {
                    path: entry_path.to_path_buf(),
                    message: err.to_string(),
                })?;

            zip.start_file(relative.as_str(), options)
                .map_err(|err| ArchiveError::Io {
                    path: output.to_path_buf(),
                    message: err.to_string(),
                })?;
            let mut source = File::open(entry_path).map_err(|err| ArchiveError::Io {
                path: entry_path.to_path_buf(),
                message: err.to_string(),
            })?;
            io::copy(&mut source, &mut zip).map_err(|err| ArchiveError::Io {
                path: entry_path.to_path_buf(),
                message: err.to_string(),
            })?;
            file_count += 1;
        }

        zip.finish().map_err(|err| ArchiveError::Io {
            path: output.to_path_buf(),
            message: err.to_string(),
        })?;

        Ok(ArchiveSummary {
            path: output.to_path_buf(),
            file_count,
        })
    }

    fn compile_globs(&self) -> Result<GlobSet, ArchiveError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excluded_globs {
            let glob = Glob::new(pattern).map_err(|err| ArchiveError::Pattern {
                pattern: pattern.clone(),
                message: err.to_string(),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|err| ArchiveError::Pattern {
            pattern: self.excluded_globs.join(", "),
            message: err.to_string(),
        })
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.excluded_dirs.iter().any(|dir| dir == name))
    }

    fn is_excluded_file(&self, entry: &DirEntry, globs: &GlobSet) -> bool {
        entry.file_name().to_str().is_some_and(|name| {
            globs.is_match(name) || self.excluded_names.iter().any(|excluded| excluded == name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};
    use tempfile::TempDir;

    fn utf8_root(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("temp path should be UTF-8")
    }

    fn entry_names(path: &Utf8Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(File::open(path).expect("archive should open"))
            .expect("archive should parse");
        let mut names: Vec<String> = archive.file_names().map(str::to_owned).collect();
        names.sort();
        names
    }

    #[test]
    fn build_skips_excluded_directories_and_patterns() {
        let tmp = TempDir::new().expect("create temp directory");
        let root = utf8_root(&tmp);
        write(root.join("index.js"), "module.exports = {};").expect("write file");
        create_dir_all(root.join("public")).expect("create dir");
        write(root.join("public/app.css"), "body {}").expect("write file");
        create_dir_all(root.join("node_modules/left-pad")).expect("create dir");
        write(root.join("node_modules/left-pad/index.js"), "x").expect("write file");
        create_dir_all(root.join(".git")).expect("create dir");
        write(root.join(".git/config"), "[core]").expect("write file");
        write(root.join("helper.py"), "print('x')").expect("write file");
        write(root.join("old.zip"), "zzz").expect("write file");

        let output = root.join("package.zip");
        let summary = ArchiveBuilder::new()
            .build(&root, &output)
            .expect("build should succeed");

        assert_eq!(summary.file_count, 2);
        assert_eq!(entry_names(&output), vec!["index.js", "public/app.css"]);
    }

    #[test]
    fn build_skips_explicitly_excluded_names() {
        let tmp = TempDir::new().expect("create temp directory");
        let root = utf8_root(&tmp);
        write(root.join("index.js"), "ok").expect("write file");
        write(root.join("site.htaccess"), "RewriteEngine On").expect("write file");

        let output = root.join("package.zip");
        let summary = ArchiveBuilder::new()
            .exclude_name("site.htaccess")
            .build(&root, &output)
            .expect("build should succeed");

        assert_eq!(summary.file_count, 1);
        assert_eq!(entry_names(&output), vec!["index.js"]);
    }

    #[test]
    fn build_excludes_nested_directories_by_name() {
        let tmp = TempDir::new().expect("create temp directory");
        let root = utf8_root(&tmp);
        create_dir_all(root.join("vendor/scripts")).expect("create dir");
        write(root.join("vendor/scripts/tool.sh"), "#!/bin/sh").expect("write file");
        write(root.join("vendor/keep.js"), "ok").expect("write file");

        let output = root.join("package.zip");
        ArchiveBuilder::new()
            .build(&root, &output)
            .expect("build should succeed");

        assert_eq!(entry_names(&output), vec!["vendor/keep.js"]);
    }

    #[test]
    fn build_rejects_missing_source() {
        let tmp = TempDir::new().expect("create temp directory");
        let root = utf8_root(&tmp);
        let missing = root.join("absent");

        let err = ArchiveBuilder::new()
            .build(&missing, &root.join("package.zip"))
            .expect_err("missing source should be rejected");
        assert!(
            matches!(err, ArchiveError::MissingSource { ref path } if *path == missing),
            "unexpected error: {err}"
        );
    }
}
