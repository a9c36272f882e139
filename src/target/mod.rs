//! Analysis targets: the source files a metric samples from.
//!
//! A target groups the files of one language under a project root. The
//! loader here is intentionally small: it classifies files well enough for
//! sample selection and leaves deeper static analysis to other tools.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::TargetError;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["vendor", "node_modules", "target", "dist", "build", "__pycache__"];

/// Files larger than this are ignored.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Go,
    Python,
    TypeScript,
    Other,
}

impl Language {
    /// Language for a file extension, if it is one we analyze.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "go" => Some(Language::Go),
            "py" => Some(Language::Python),
            "ts" | "tsx" | "js" | "jsx" | "mjs" => Some(Language::TypeScript),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Go => "go",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::Other => "other",
        };
        f.write_str(name)
    }
}

/// Role of a file within the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileClass {
    Source,
    Test,
    Generated,
    Excluded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the target root, with `/` separators.
    pub rel_path: String,
    pub language: Language,
    pub class: FileClass,
    pub lines: usize,
    #[serde(skip)]
    pub content: String,
}

impl SourceFile {
    /// Builds an in-memory source file; `lines` is derived from `content`.
    pub fn new(rel_path: impl Into<String>, language: Language, content: impl Into<String>) -> Self {
        let rel_path = rel_path.into();
        let content = content.into();
        Self {
            path: PathBuf::from(&rel_path),
            class: classify(&rel_path, language, &content),
            rel_path,
            language,
            lines: count_lines(&content),
            content,
        }
    }

    pub fn with_class(mut self, class: FileClass) -> Self {
        self.class = class;
        self
    }
}

/// Files of one language under a project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTarget {
    pub root_dir: PathBuf,
    pub language: Language,
    pub files: Vec<SourceFile>,
}

impl AnalysisTarget {
    pub fn new(root_dir: impl AsRef<Path>, language: Language, files: Vec<SourceFile>) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            language,
            files,
        }
    }

    /// Files classified as [`FileClass::Source`].
    pub fn source_files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter().filter(|f| f.class == FileClass::Source)
    }
}

/// Walks `root` and returns one target per detected language, in language order.
pub fn load_targets(root: &Path) -> Result<Vec<AnalysisTarget>, TargetError> {
    if !root.is_dir() {
        return Err(TargetError::NotADirectory(root.to_path_buf()));
    }

    let mut by_language: BTreeMap<Language, Vec<SourceFile>> = BTreeMap::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

    for entry in walker {
        let entry = entry.map_err(|e| TargetError::Walk {
            path: root.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(language) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
        else {
            continue;
        };
        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        // Binary or non-UTF-8 files are not worth sampling.
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };

        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut file = SourceFile::new(rel_path, language, content);
        file.path = path.to_path_buf();
        by_language.entry(language).or_default().push(file);
    }

    let targets: Vec<AnalysisTarget> = by_language
        .into_iter()
        .map(|(language, files)| AnalysisTarget::new(root, language, files))
        .collect();

    debug!(
        root = %root.display(),
        targets = targets.len(),
        files = targets.iter().map(|t| t.files.len()).sum::<usize>(),
        "Loaded analysis targets"
    );
    Ok(targets)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

fn count_lines(content: &str) -> usize {
    content.lines().count()
}

/// Classifies a file by naming convention and generated-code markers.
pub fn classify(rel_path: &str, language: Language, content: &str) -> FileClass {
    let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    let is_test = match language {
        Language::Go => name.ends_with("_test.go"),
        Language::Python => {
            (name.starts_with("test_") || name.ends_with("_test.py") || name == "conftest.py")
                && name.ends_with(".py")
        }
        Language::TypeScript => [".test.", ".spec."].iter().any(|m| name.contains(m)),
        Language::Other => false,
    } || rel_path.split('/').any(|part| part == "__tests__");

    if is_test {
        return FileClass::Test;
    }
    if language == Language::Go && is_generated_go(content) {
        return FileClass::Generated;
    }
    if name.ends_with(".min.js") || name.ends_with(".d.ts") {
        return FileClass::Excluded;
    }
    FileClass::Source
}

fn is_generated_go(content: &str) -> bool {
    content
        .lines()
        .take(10)
        .any(|l| l.starts_with("// Code generated") && l.contains("DO NOT EDIT"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_classify() {
        assert_eq!(classify("pkg/a_test.go", Language::Go, ""), FileClass::Test);
        assert_eq!(classify("pkg/a.go", Language::Go, "package a"), FileClass::Source);
        assert_eq!(
            classify("pkg/a.pb.go", Language::Go, "// Code generated by protoc-gen-go. DO NOT EDIT.\n"),
            FileClass::Generated
        );
        assert_eq!(classify("tests/test_x.py", Language::Python, ""), FileClass::Test);
        assert_eq!(classify("src/x.py", Language::Python, ""), FileClass::Source);
        assert_eq!(classify("src/a.spec.ts", Language::TypeScript, ""), FileClass::Test);
        assert_eq!(classify("src/__tests__/a.ts", Language::TypeScript, ""), FileClass::Test);
        assert_eq!(classify("types/index.d.ts", Language::TypeScript, ""), FileClass::Excluded);
    }

    #[test]
    fn test_source_file_line_count() {
        let file = SourceFile::new("main.go", Language::Go, "package main\n\nfunc main() {}\n");
        assert_eq!(file.lines, 3);
        assert_eq!(file.class, FileClass::Source);
    }

    #[test]
    fn test_load_targets_groups_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("cmd")).unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("cmd/main.go"), "package main\n").unwrap();
        fs::write(root.join("cmd/main_test.go"), "package main\n").unwrap();
        fs::write(root.join("tool.py"), "print('hi')\n").unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "x\n").unwrap();
        fs::write(root.join(".git/config.py"), "x\n").unwrap();
        fs::write(root.join("README.md"), "# hi\n").unwrap();

        let targets = load_targets(root).unwrap();
        assert_eq!(targets.len(), 2);

        let go = &targets[0];
        assert_eq!(go.language, Language::Go);
        assert_eq!(go.files.len(), 2);
        assert_eq!(go.source_files().count(), 1);
        assert_eq!(go.source_files().next().unwrap().rel_path, "cmd/main.go");

        let py = &targets[1];
        assert_eq!(py.language, Language::Python);
        assert_eq!(py.files[0].rel_path, "tool.py");
    }

    #[test]
    fn test_load_targets_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.go");
        fs::write(&file, "package x\n").unwrap();
        assert!(matches!(load_targets(&file), Err(TargetError::NotADirectory(_))));
    }
}
