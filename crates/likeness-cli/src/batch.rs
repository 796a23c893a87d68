//! Directory-scan batch input.
//!
//! Mirrors the upload layout of the identity-proofing backend: one
//! subdirectory per user, each holding one `*.jpg` file whose name contains
//! "gov-id" and one containing "selfie". Users with zero or multiple
//! candidates for either role are reported as incomplete and skipped; they
//! are never handed to the verification pipeline.

use std::io;
use std::path::{Path, PathBuf};

pub const GOV_ID_MARKER: &str = "gov-id";
pub const SELFIE_MARKER: &str = "selfie";
const IMAGE_EXTENSION: &str = "jpg";

/// One user's located image pair.
#[derive(Debug)]
pub struct UserPair {
    pub user: String,
    pub gov_id: PathBuf,
    pub selfie: PathBuf,
}

/// Scan result for one user directory.
#[derive(Debug)]
pub enum PairStatus {
    Complete(UserPair),
    Incomplete { user: String, reason: String },
}

/// Scan a root directory of per-user subdirectories, sorted by name for
/// stable output order. Non-directory entries at the root are ignored.
pub fn scan(root: &Path) -> io::Result<Vec<PairStatus>> {
    let mut users: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    users.sort();

    let mut statuses = Vec::with_capacity(users.len());
    for dir in users {
        let user = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        statuses.push(pair_status(&dir, user)?);
    }
    Ok(statuses)
}

fn pair_status(dir: &Path, user: String) -> io::Result<PairStatus> {
    let gov_id = candidates(dir, GOV_ID_MARKER)?;
    let selfie = candidates(dir, SELFIE_MARKER)?;

    match (gov_id.as_slice(), selfie.as_slice()) {
        ([gov_id], [selfie]) => Ok(PairStatus::Complete(UserPair {
            user,
            gov_id: gov_id.clone(),
            selfie: selfie.clone(),
        })),
        _ => Ok(PairStatus::Incomplete {
            user,
            reason: format!(
                "expected exactly one {GOV_ID_MARKER} and one {SELFIE_MARKER} image, found {} and {}",
                gov_id.len(),
                selfie.len()
            ),
        }),
    }
}

/// All `*.jpg` files in `dir` whose name contains `marker`, sorted by name.
fn candidates(dir: &Path, marker: &str) -> io::Result<Vec<PathBuf>> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(IMAGE_EXTENSION)
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.contains(marker))
        })
        .collect();
    found.sort();
    Ok(found)
}
