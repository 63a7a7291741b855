use std::path::PathBuf;

use crate::types::{Snapshot, SnapshotKind};

/// What to do on disk to remove one expired snapshot. Pure data — all
/// filesystem mutation happens in `snapkeep-daemon::fsops`, which executes
/// exactly one of these per expired snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpirationAction {
    /// `expired` is itself a symlink: remove just the link.
    RemoveSymlink(PathBuf),
    /// `expired` is physical and nothing aliases it: remove the tree.
    RemoveDirectory(PathBuf),
    /// `expired` is physical and `relink` aliases point at it. Promote the
    /// first alias (`promote_to`) to take over the physical location, then
    /// repoint every remaining alias at the new physical path.
    PromoteAlias {
        expired_physical: PathBuf,
        promote_to: PathBuf,
        relink: Vec<PathBuf>,
    },
}

/// Decide the action for one expired snapshot, given its current aliases
/// (`SnapshotCatalog::aliases_of(expired)`, already in catalog order so
/// `aliases[0]` is the promotion target).
pub fn plan(expired: &Snapshot, aliases: &[&Snapshot]) -> ExpirationAction {
    match &expired.kind {
        SnapshotKind::Symlink { .. } => ExpirationAction::RemoveSymlink(expired.path.clone()),
        SnapshotKind::Physical => match aliases.split_first() {
            None => ExpirationAction::RemoveDirectory(expired.path.clone()),
            Some((first, rest)) => ExpirationAction::PromoteAlias {
                expired_physical: expired.path.clone(),
                promote_to: first.path.clone(),
                relink: rest.iter().map(|s| s.path.clone()).collect(),
            },
        },
    }
}
