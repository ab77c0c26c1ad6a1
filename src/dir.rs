// src/dir.rs
use crate::fs::{
    DirEntryDisk, DiskInode, Image, InodeType, BSIZE, DIRENT_SIZE, EPB, MAXFILE, NDIRECT,
    ROOTINO,
};
use crate::fsck::{FsckError, FsckResult, FsckState};

// --------- Lectura de entradas ---------

/// Direcciones de los bloques del inodo en orden lógico: directos y luego
/// los del bloque indirecto. Un 0 es un hueco.
pub fn block_addresses(image: &Image<'_>, dip: &DiskInode) -> FsckResult<Vec<u32>> {
    let mut addrs = Vec::with_capacity(MAXFILE);
    addrs.extend_from_slice(&dip.addrs[..NDIRECT]);

    let needed = (dip.size as usize).div_ceil(BSIZE);
    if needed > NDIRECT {
        match dip.indirect() {
            0 => addrs.resize(MAXFILE, 0),
            ind => addrs.extend(image.indirect_addrs(ind)?),
        }
    }
    Ok(addrs)
}

/// Entradas del directorio en orden de bloque, hasta `size` bytes.
pub fn directory_entries(image: &Image<'_>, dip: &DiskInode) -> FsckResult<Vec<DirEntryDisk>> {
    let mut remaining = dip.size as usize / DIRENT_SIZE;
    // `size` viene del disco; nunca hay más de MAXFILE bloques de entradas.
    let mut entries = Vec::with_capacity(remaining.min(MAXFILE * EPB));

    for addr in block_addresses(image, dip)? {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(EPB);

        if addr == 0 {
            entries.extend(std::iter::repeat(DirEntryDisk::default()).take(take));
        } else {
            let block = image.block(addr)?;
            entries.extend(
                block
                    .chunks_exact(DIRENT_SIZE)
                    .take(take)
                    .map(DirEntryDisk::decode),
            );
        }
        remaining -= take;
    }

    Ok(entries)
}

// --------- Validación de un directorio ---------

/// Recorre el directorio `inum`: "." y "..", referencias colgantes, enlaces
/// duplicados a directorios y conteo de referencias de archivos.
pub fn check_directory(
    image: &Image<'_>,
    state: &mut FsckState,
    inum: u32,
    dip: &DiskInode,
) -> FsckResult {
    let mut found_self = false;
    let mut found_parent = false;

    let entries = directory_entries(image, dip)?;
    log::debug!("directorio {inum}: {} entradas", entries.len());

    for de in entries.iter().filter(|de| de.inum != 0) {
        let target = u32::from(de.inum);

        if !state.is_allocated(target) {
            return Err(FsckError::DanglingDirectoryReference {
                dir: inum,
                target,
                name: de.name_lossy(),
            });
        }

        match de.name_bytes() {
            b"." => {
                found_self = true;
                if target != inum {
                    return Err(FsckError::MalformedDirectory { inum });
                }
            }
            b".." => {
                if inum == ROOTINO && target != inum {
                    return Err(FsckError::RootNotDirectory);
                }
                found_parent = true;
            }
            name => {
                let child = image.inode(target)?;
                if child.is(InodeType::Dir) {
                    if !state.visited.claim(target) {
                        return Err(FsckError::DuplicateDirectoryLink { dir: inum, target });
                    }
                } else if child.is(InodeType::File) && !name.is_empty() {
                    state.add_reference(target);
                }
            }
        }

        state.visited.clear(target);
    }

    if !found_self || !found_parent {
        return Err(FsckError::MalformedDirectory { inum });
    }
    Ok(())
}
