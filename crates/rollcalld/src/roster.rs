//! Enrollment roster loading.
//!
//! The roster is a TOML file of `[[student]]` tables. When no roster file
//! exists the default roster embedded from `contrib/roster.toml` is used.

use rollcall_core::{Identity, ReferenceImage, Roster};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_ROSTER: &str = include_str!("../../../contrib/roster.toml");

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("failed to read roster {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid roster TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate student name in roster: {0}")]
    DuplicateLabel(String),
    #[error("roster has no students")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    student: Vec<StudentEntry>,
}

#[derive(Debug, Deserialize)]
struct StudentEntry {
    id: String,
    name: String,
    image: PathBuf,
}

/// Load the roster at `path`, falling back to the embedded default.
///
/// Relative image paths resolve against the roster file's directory, or
/// against `data_dir` for the embedded roster.
pub fn load(path: &Path, data_dir: &Path) -> Result<(Roster, Vec<ReferenceImage>), RosterError> {
    if path.exists() {
        let src = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or(data_dir);
        tracing::info!(path = %path.display(), "loading roster");
        parse(&src, base)
    } else {
        tracing::info!(path = %path.display(), "no roster file, using embedded default");
        parse(DEFAULT_ROSTER, data_dir)
    }
}

/// Parse roster TOML, resolving relative image paths against `base`.
pub fn parse(src: &str, base: &Path) -> Result<(Roster, Vec<ReferenceImage>), RosterError> {
    let file: RosterFile = toml::from_str(src)?;
    if file.student.is_empty() {
        return Err(RosterError::Empty);
    }

    let mut seen = HashSet::new();
    let mut identities = Vec::with_capacity(file.student.len());
    let mut references = Vec::with_capacity(file.student.len());

    for student in file.student {
        if !seen.insert(student.name.clone()) {
            return Err(RosterError::DuplicateLabel(student.name));
        }
        let path = if student.image.is_absolute() {
            student.image
        } else {
            base.join(student.image)
        };
        references.push(ReferenceImage { label: student.name.clone(), path });
        identities.push(Identity::new(student.id, student.name));
    }

    Ok((Roster::new(identities), references))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_roster() {
        let (roster, refs) = parse(DEFAULT_ROSTER, Path::new("/data")).unwrap();
        let ids: Vec<_> = roster.identities().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["S101", "S102", "S103"]);
        assert_eq!(refs[1].label, "mustafa");
        assert_eq!(refs[1].path, PathBuf::from("/data/known_faces/mustafa.jpg"));
        assert!(roster.identities().iter().all(|i| i.present == 0 && i.absent == 0));
    }

    #[test]
    fn test_absolute_image_kept() {
        let src = r#"
            [[student]]
            id = "A1"
            name = "alice"
            image = "/srv/faces/alice.png"
        "#;
        let (_, refs) = parse(src, Path::new("/data")).unwrap();
        assert_eq!(refs[0].path, PathBuf::from("/srv/faces/alice.png"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let src = r#"
            [[student]]
            id = "A1"
            name = "alice"
            image = "a.jpg"

            [[student]]
            id = "A2"
            name = "alice"
            image = "b.jpg"
        "#;
        assert!(matches!(parse(src, Path::new(".")), Err(RosterError::DuplicateLabel(n)) if n == "alice"));
    }

    #[test]
    fn test_empty_roster_rejected() {
        assert!(matches!(parse("", Path::new(".")), Err(RosterError::Empty)));
    }

    #[test]
    fn test_file_relative_to_roster_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.toml");
        std::fs::write(&path, "[[student]]\nid = \"B7\"\nname = \"bob\"\nimage = \"faces/bob.jpg\"\n").unwrap();

        let (roster, refs) = load(&path, Path::new("/unused")).unwrap();
        assert_eq!(roster.find("bob").map(|i| i.id.as_str()), Some("B7"));
        assert_eq!(refs[0].path, dir.path().join("faces/bob.jpg"));
    }

    #[test]
    fn test_missing_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let (roster, refs) = load(&dir.path().join("absent.toml"), dir.path()).unwrap();
        assert_eq!(roster.identities().len(), 3);
        assert_eq!(refs[0].path, dir.path().join("known_faces/atiksh.jpg"));
    }
}
