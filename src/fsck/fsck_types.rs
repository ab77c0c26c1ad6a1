/*Tipos compartidos del fsck:
FsckError (un diagnóstico por cada violación posible),
FsckState (bitmaps sombra y contadores de referencias que el chequeo muta) */

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::bitmap::{BitmapOps, ShadowBitmap};
use crate::fs::{Image, InodeType};

/// Qué clase de puntero contenía la dirección en falta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Direct,
    Indirect,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressKind::Direct => f.write_str("directa"),
            AddressKind::Indirect => f.write_str("indirecta"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FsckError {
    #[error("Uso: fsck.xv6 <imagen_del_sistema_de_archivos>")]
    Usage,
    #[error("{action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("mmap falló para {path:?}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("imagen truncada: {what} ocupa {start}..{end} pero el límite es {len}")]
    TruncatedImage {
        what: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("inodo inválido: el inodo {inum} tiene tipo {raw}")]
    BadInodeType { inum: u32, raw: i16 },
    #[error("dirección directa inválida en el inodo {inum} (bloque {addr})")]
    BadDirectAddress { inum: u32, addr: u32 },
    #[error("dirección indirecta inválida en el inodo {inum} (bloque {addr})")]
    BadIndirectAddress { inum: u32, addr: u32 },
    #[error("el inodo {inum} usa la dirección {addr} pero el bitmap la marca libre")]
    AddressNotMarkedUsed { inum: u32, addr: u32 },
    #[error("dirección {kind} {addr} usada más de una vez (inodo {inum})")]
    AddressUsedTwice {
        inum: u32,
        addr: u32,
        kind: AddressKind,
    },
    #[error("el directorio raíz no existe")]
    RootNotDirectory,
    #[error("el directorio {dir} referencia al inodo {target} ({name:?}) marcado como libre")]
    DanglingDirectoryReference { dir: u32, target: u32, name: String },
    #[error("el directorio {inum} no tiene el formato correcto")]
    MalformedDirectory { inum: u32 },
    #[error(
        "el directorio {target} aparece más de una vez en el sistema de archivos \
         (en el directorio {dir})"
    )]
    DuplicateDirectoryLink { dir: u32, target: u32 },
    #[error("el bitmap marca el bloque {block} en uso pero ningún inodo lo usa")]
    LeakedBlock { block: u32 },
    #[error("el inodo {inum} está marcado en uso pero no aparece en ningún directorio")]
    OrphanInode { inum: u32 },
    #[error(
        "cuenta de referencias incorrecta para el archivo {inum}: \
         nlink={stored}, entradas={found}"
    )]
    BadLinkCount { inum: u32, stored: i16, found: u32 },
}

pub type FsckResult<T = ()> = Result<T, FsckError>;

/// Estado mutable del chequeo. Se crea una vez por imagen y sólo cambia
/// durante la pasada.
#[derive(Debug, Clone)]
pub struct FsckState {
    /// Copia del bitmap de bloques; se limpia cada bloque al reclamarlo.
    pub block_shadow: ShadowBitmap,
    /// Bit por inodo, puesto si el tipo no es libre.
    pub inode_map: Vec<u8>,
    /// Copia de `inode_map`; se limpia cuando un directorio nombra al inodo.
    pub visited: ShadowBitmap,
    /// Entradas de directorio que nombran a cada archivo regular.
    pub refcounts: Vec<u32>,
}

impl FsckState {
    pub fn new(image: &Image<'_>) -> FsckResult<Self> {
        let ninodes = image.ninodes();
        let mut inode_map = vec![0u8; ninodes as usize / 8 + 1];

        for inum in 0..ninodes {
            if !image.inode(inum)?.is(InodeType::Free) {
                inode_map.set_bit(inum as usize);
            }
        }

        Ok(Self {
            block_shadow: ShadowBitmap::from_authoritative(image.block_bitmap()),
            visited: ShadowBitmap::from_authoritative(&inode_map),
            inode_map,
            refcounts: vec![0; ninodes as usize],
        })
    }

    pub fn is_allocated(&self, inum: u32) -> bool {
        self.inode_map.get_bit(inum as usize)
    }

    pub fn add_reference(&mut self, inum: u32) {
        if let Some(count) = self.refcounts.get_mut(inum as usize) {
            *count += 1;
        }
    }

    pub fn references(&self, inum: u32) -> u32 {
        self.refcounts.get(inum as usize).copied().unwrap_or(0)
    }
}
