//! Work-list persistence between the detach and delete phases.
//!
//! Detach-only runs write the detached targets as JSON Lines; a later
//! delete-from-file run reads them back. The file is written wholesale once
//! and read wholesale once, so no locking is attempted.

use std::collections::HashSet;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::inventory::AttachmentTarget;

/// Errors raised while reading or writing a work-list.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WorkListError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the path does not name a file.
    #[error("work-list path {path} is missing a file name")]
    InvalidPath {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when a record cannot be serialised.
    #[error("failed to encode work-list record: {message}")]
    Encode {
        /// Serialiser error message.
        message: String,
    },
    /// Raised when a supplied file contains no valid record.
    #[error("{path} contains no valid volume group records (each needs a non-empty uuid and name)")]
    Empty {
        /// Path that was read.
        path: Utf8PathBuf,
    },
}

/// Splits `path` into an opened parent directory and the file name.
fn open_parent(path: &Utf8Path, create: bool) -> Result<(Dir, &str), WorkListError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| WorkListError::InvalidPath {
        path: path.to_path_buf(),
    })?;
    let io_error = |err: io::Error| WorkListError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    };

    if create {
        Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(io_error)?;
    }
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_error)?;
    Ok((dir, file_name))
}

/// Writes `targets` to `path` as JSON Lines, replacing any existing file.
///
/// # Errors
///
/// Returns [`WorkListError`] when the file cannot be written.
pub fn write(path: &Utf8Path, targets: &[AttachmentTarget]) -> Result<(), WorkListError> {
    let mut rendered = String::new();
    for target in targets {
        let line = serde_json::to_string(target).map_err(|err| WorkListError::Encode {
            message: err.to_string(),
        })?;
        rendered.push_str(&line);
        rendered.push('\n');
    }

    let (dir, file_name) = open_parent(path, true)?;
    dir.write(file_name, rendered)
        .map_err(|err| WorkListError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    debug!(path = %path, records = targets.len(), "wrote work-list");
    Ok(())
}

/// Loads a work-list, dropping malformed or incomplete records.
///
/// # Errors
///
/// Returns [`WorkListError::Empty`] when nothing valid remains, or
/// [`WorkListError::Io`] when the file cannot be read.
pub fn load(path: &Utf8Path) -> Result<Vec<AttachmentTarget>, WorkListError> {
    let (dir, file_name) = open_parent(path, false)?;
    let contents = dir
        .read_to_string(file_name)
        .map_err(|err| WorkListError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

    let targets = parse(&contents);
    if targets.is_empty() {
        return Err(WorkListError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(targets)
}

/// Parses JSON Lines, or a single JSON array, into unique valid targets.
///
/// Records without a non-empty `uuid` and `name` are dropped, as are lines
/// that are not JSON objects. The first record for a `uuid` wins.
#[must_use]
pub fn parse(contents: &str) -> Vec<AttachmentTarget> {
    let trimmed = contents.trim_start();
    let records: Vec<Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).unwrap_or_default()
    } else {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    };

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for record in records {
        let Some(target) = normalise(record) else {
            continue;
        };
        if seen.insert(target.volume_group_id.clone()) {
            targets.push(target);
        }
    }
    targets
}

fn normalise(record: Value) -> Option<AttachmentTarget> {
    let target: AttachmentTarget = serde_json::from_value(record).ok()?;
    let volume_group_id = target.volume_group_id.trim();
    let volume_group_name = target.volume_group_name.trim();
    if volume_group_id.is_empty() || volume_group_name.is_empty() {
        return None;
    }
    let non_blank = |value: Option<String>| value.filter(|text| !text.trim().is_empty());
    Some(AttachmentTarget {
        volume_group_id: volume_group_id.to_owned(),
        volume_group_name: volume_group_name.to_owned(),
        attached_vm: non_blank(target.attached_vm),
        attached_vm_name: non_blank(target.attached_vm_name),
    })
}
