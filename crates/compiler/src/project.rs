//! `.ssproject` file loading.
//!
//! The project file is an XML-like document with an `<Entry>` tag naming
//! the entry source relative to the project directory and an optional
//! `<ImportRoots>` list of `<Root>` directories. When `ImportRoots` is
//! absent, the project directory itself is the only root.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub project_file: PathBuf,
    pub project_dir: PathBuf,
    pub entry_file: PathBuf,
    pub import_roots: Vec<PathBuf>,
}

fn extract_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(&text[start..end])
}

fn extract_repeated_tags<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(found) = text[pos..].find(&open) {
        let start = pos + found + open.len();
        let Some(end) = text[start..].find(&close) else {
            break;
        };
        out.push(&text[start..start + end]);
        pos = start + end + close.len();
    }
    out
}

impl Project {
    pub fn load(path: &Path) -> Result<Project, String> {
        let text =
            fs::read_to_string(path).map_err(|e| format!("cannot open {}: {e}", path.display()))?;
        let project_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let entry = extract_tag(&text, "Entry")
            .ok_or_else(|| "missing <Entry>...</Entry> in project file".to_string())?;
        let entry_file = project_dir.join(entry.trim());

        let import_roots = match extract_tag(&text, "ImportRoots") {
            Some(block) => extract_repeated_tags(block, "Root")
                .into_iter()
                .map(|root| project_dir.join(root.trim()))
                .collect(),
            None => vec![project_dir.clone()],
        };

        Ok(Project {
            project_file: path.to_path_buf(),
            project_dir,
            entry_file,
            import_roots,
        })
    }

    /// Project name for default output paths: the file stem.
    pub fn name(&self) -> String {
        self.project_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_entry_and_roots() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Game.ssproject");
        fs::write(
            &file,
            "<Project>\n  <Entry>Scripts/main.ss</Entry>\n  <ImportRoots>\n    <Root>Scripts</Root>\n    <Root>Libs</Root>\n  </ImportRoots>\n</Project>",
        )
        .unwrap();

        let project = Project::load(&file).unwrap();
        assert_eq!(project.entry_file, dir.path().join("Scripts/main.ss"));
        assert_eq!(
            project.import_roots,
            vec![dir.path().join("Scripts"), dir.path().join("Libs")]
        );
        assert_eq!(project.name(), "Game");
    }

    #[test]
    fn missing_import_roots_defaults_to_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Solo.ssproject");
        fs::write(&file, "<Entry>main.ss</Entry>").unwrap();

        let project = Project::load(&file).unwrap();
        assert_eq!(project.import_roots, vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn missing_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Broken.ssproject");
        fs::write(&file, "<ImportRoots><Root>.</Root></ImportRoots>").unwrap();

        let err = Project::load(&file).unwrap_err();
        assert!(err.contains("missing <Entry>"));
    }
}
