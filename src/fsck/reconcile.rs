use crate::fs::{Image, InodeType, ROOTINO};

use super::fsck_types::{FsckError, FsckResult, FsckState};

/// Última pasada: bloques marcados y nunca reclamados, inodos sin
/// directorio y cuentas de enlaces.
pub(crate) fn reconcile(image: &Image<'_>, state: &FsckState) -> FsckResult {
    let geo = image.geometry();
    log::debug!("reconciliando bloques {}..{}", geo.meta_blocks, geo.size);

    if let Some(block) = (geo.meta_blocks..geo.size).find(|&b| state.block_shadow.get(b)) {
        return Err(FsckError::LeakedBlock { block });
    }

    for inum in ROOTINO..image.ninodes() {
        if state.is_allocated(inum) && state.visited.get(inum) {
            return Err(FsckError::OrphanInode { inum });
        }

        let dip = image.inode(inum)?;
        if dip.is(InodeType::File) {
            let found = state.references(inum);
            if i64::from(dip.nlink) != i64::from(found) {
                return Err(FsckError::BadLinkCount {
                    inum,
                    stored: dip.nlink,
                    found,
                });
            }
        }
    }

    Ok(())
}
