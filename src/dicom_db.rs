//! DICOM header lookup used to cross-reference exported annotations against
//! their study and series.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dicom::core::Tag;
use dicom::object::{open_file, DefaultDicomObject};
use thiserror::Error;

pub const TAG_SOP_INSTANCE_UID: &str = "0008,0018";
pub const TAG_STUDY_INSTANCE_UID: &str = "0020,000d";
pub const TAG_SERIES_INSTANCE_UID: &str = "0020,000e";

/// Header access for one DICOM instance at a time.
///
/// `load_instance_header` scopes the following `header_value` calls to one
/// instance. Values come back in bracketed form (`prefix[VALUE]suffix`);
/// callers strip them with [`strip_bracketed`]. An empty string means the
/// element is unavailable.
pub trait HeaderLookup {
    fn load_instance_header(&mut self, sop_instance_uid: &str) -> bool;
    /// Value of a header element addressed as `"GGGG,EEEE"` in hex.
    fn header_value(&self, tag: &str) -> String;
}

/// Extracts `VALUE` from the `prefix[VALUE]suffix` form header values use.
pub fn strip_bracketed(value: &str) -> Option<&str> {
    let start = value.find('[')? + 1;
    let end = value[start..].find(']')? + start;
    Some(&value[start..end])
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to read DICOM directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no readable DICOM instances under {0}")]
    Empty(PathBuf),
}

/// Flat-directory DICOM store indexed by SOP Instance UID at open time.
pub struct DicomDirDatabase {
    instances: HashMap<String, PathBuf>,
    current: Option<DefaultDicomObject>,
}

impl DicomDirDatabase {
    /// Indexes every parseable DICOM file directly under `dir`. Files that
    /// fail to parse or carry no SOP Instance UID are logged and skipped;
    /// an empty index is an error.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| DatabaseError::ReadDir {
            path: dir.to_owned(),
            source,
        })?;

        let mut instances = HashMap::new();
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match open_file(&path) {
                Ok(object) => {
                    let uid = object
                        .element_by_name("SOPInstanceUID")
                        .ok()
                        .and_then(|element| element.to_str().ok())
                        .map(|value| value.trim().to_owned());
                    match uid {
                        Some(uid) if !uid.is_empty() => {
                            instances.insert(uid, path);
                        }
                        _ => log::warn!("{}: no SOPInstanceUID, skipping", path.display()),
                    }
                }
                Err(err) => {
                    log::warn!("{}: not a readable DICOM file ({err})", path.display());
                }
            }
        }
        if instances.is_empty() {
            return Err(DatabaseError::Empty(dir.to_owned()));
        }
        log::info!(
            "indexed {} DICOM instance(s) under {}",
            instances.len(),
            dir.display()
        );
        Ok(Self {
            instances,
            current: None,
        })
    }
}

fn parse_tag(tag: &str) -> Option<Tag> {
    let (group, element) = tag.split_once(',')?;
    let group = u16::from_str_radix(group.trim(), 16).ok()?;
    let element = u16::from_str_radix(element.trim(), 16).ok()?;
    Some(Tag(group, element))
}

impl HeaderLookup for DicomDirDatabase {
    fn load_instance_header(&mut self, sop_instance_uid: &str) -> bool {
        self.current = None;
        let Some(path) = self.instances.get(sop_instance_uid) else {
            log::error!("instance {sop_instance_uid} is not in the database index");
            return false;
        };
        match open_file(path) {
            Ok(object) => {
                self.current = Some(object);
                true
            }
            Err(err) => {
                log::error!("{}: failed to load instance header ({err})", path.display());
                false
            }
        }
    }

    fn header_value(&self, tag: &str) -> String {
        let Some(object) = &self.current else {
            log::error!("header_value called before load_instance_header");
            return String::new();
        };
        let Some(tag) = parse_tag(tag) else {
            log::error!("header_value: malformed tag");
            return String::new();
        };
        match object.element(tag) {
            Ok(element) => match element.to_str() {
                Ok(value) => format!("[{}]", value.trim()),
                Err(err) => {
                    log::warn!("header_value: element {tag} is not textual ({err})");
                    String::new()
                }
            },
            Err(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_stripping() {
        assert_eq!(strip_bracketed("[1.2.3]"), Some("1.2.3"));
        assert_eq!(strip_bracketed("DICOM tag [1.2.3] (UI)"), Some("1.2.3"));
        assert_eq!(strip_bracketed("[]"), Some(""));
        assert_eq!(strip_bracketed("no brackets"), None);
        assert_eq!(strip_bracketed("only [open"), None);
    }

    #[test]
    fn tag_parsing() {
        assert_eq!(parse_tag("0008,0018"), Some(Tag(0x0008, 0x0018)));
        assert_eq!(parse_tag("0020,000e"), Some(Tag(0x0020, 0x000e)));
        assert_eq!(parse_tag("garbage"), None);
        assert_eq!(parse_tag("zzzz,0001"), None);
    }

    #[test]
    fn open_fails_on_missing_directory() {
        assert!(matches!(
            DicomDirDatabase::open("/definitely/not/here"),
            Err(DatabaseError::ReadDir { .. })
        ));
    }

    #[test]
    fn open_fails_on_directory_without_instances() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not dicom").unwrap();
        assert!(matches!(
            DicomDirDatabase::open(dir.path()),
            Err(DatabaseError::Empty(_))
        ));
    }
}
