use crate::bitmap::BitmapOps;
use crate::dir;
use crate::fs::{DiskInode, Image, InodeType, ROOTINO};

use super::fsck_types::{AddressKind, FsckError, FsckResult, FsckState};

/// Valida un inodo: tipo, punteros directos, puntero indirecto y su
/// contenido, y si es directorio lo recorre antes de volver.
pub(crate) fn check_inode(image: &Image<'_>, state: &mut FsckState, inum: u32) -> FsckResult {
    let dip = image.inode(inum)?;
    let kind = dip.inode_type().ok_or(FsckError::BadInodeType {
        inum,
        raw: dip.kind,
    })?;

    check_addresses(image, state, inum, &dip)?;

    if inum == ROOTINO && kind != InodeType::Dir {
        return Err(FsckError::RootNotDirectory);
    }

    if kind == InodeType::Dir {
        dir::check_directory(image, state, inum, &dip)?;
    }

    Ok(())
}

fn check_addresses(
    image: &Image<'_>,
    state: &mut FsckState,
    inum: u32,
    dip: &DiskInode,
) -> FsckResult {
    let (direct, indirect) = dip.addrs.split_at(dip.addrs.len() - 1);

    for &addr in direct.iter().filter(|&&a| a != 0) {
        claim_block(image, state, inum, addr, AddressKind::Direct)?;
    }

    let indirect = indirect[0];
    if indirect == 0 {
        return Ok(());
    }
    claim_block(image, state, inum, indirect, AddressKind::Indirect)?;

    for addr in image.indirect_addrs(indirect)? {
        if addr != 0 {
            claim_block(image, state, inum, addr, AddressKind::Indirect)?;
        }
    }
    Ok(())
}

/// Rango, bitmap en disco y doble uso, en ese orden.
fn claim_block(
    image: &Image<'_>,
    state: &mut FsckState,
    inum: u32,
    addr: u32,
    kind: AddressKind,
) -> FsckResult {
    if !image.geometry().is_data_block(addr) {
        return Err(match kind {
            AddressKind::Direct => FsckError::BadDirectAddress { inum, addr },
            AddressKind::Indirect => FsckError::BadIndirectAddress { inum, addr },
        });
    }

    if !image.block_bitmap().get_bit(addr as usize) {
        return Err(FsckError::AddressNotMarkedUsed { inum, addr });
    }

    if !state.block_shadow.claim(addr) {
        return Err(FsckError::AddressUsedTwice { inum, addr, kind });
    }

    log::trace!("inodo {inum}: bloque {addr} reclamado");
    Ok(())
}
