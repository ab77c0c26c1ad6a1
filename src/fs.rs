use std::ops::Range;

use crate::fsck::FsckError;

// -----------------------------------------------------------------------------
// Constantes del formato en disco (layout xv6)
// -----------------------------------------------------------------------------

pub const BSIZE: usize = 512;
pub const ROOTINO: u32 = 1;

pub const NDIRECT: usize = 12;
pub const NINDIRECT: usize = BSIZE / 4;
/// Máximo de bloques direccionables por un inodo.
pub const MAXFILE: usize = NDIRECT + NINDIRECT;

pub const DINODE_SIZE: usize = 64;
/// Inodos por bloque.
pub const IPB: u32 = (BSIZE / DINODE_SIZE) as u32;
/// Bits de bitmap por bloque.
pub const BPB: u32 = (BSIZE * 8) as u32;

pub const DIRSIZ: usize = 14;
pub const DIRENT_SIZE: usize = 16;
/// Entradas de directorio por bloque.
pub const EPB: usize = BSIZE / DIRENT_SIZE;

pub const SUPERBLOCK_BLOCK: u32 = 1;
pub const INODE_START: u32 = 2;

fn le_u16(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

fn le_i16(b: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([b[off], b[off + 1]])
}

fn le_u32(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

// -------------------- Estructuras en disco --------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InodeType {
    Free,
    Dir,
    File,
    Device,
}

impl InodeType {
    pub fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(InodeType::Free),
            1 => Some(InodeType::Dir),
            2 => Some(InodeType::File),
            3 => Some(InodeType::Device),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i16 {
        match self {
            InodeType::Free => 0,
            InodeType::Dir => 1,
            InodeType::File => 2,
            InodeType::Device => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Superblock {
    /// Tamaño total de la imagen en bloques.
    pub size: u32,
    pub nblocks: u32,
    pub ninodes: u32,
    pub nlog: u32,
}

impl Superblock {
    pub const DISK_SIZE: usize = 16;

    pub fn decode(b: &[u8]) -> Self {
        Self {
            size: le_u32(b, 0),
            nblocks: le_u32(b, 4),
            ninodes: le_u32(b, 8),
            nlog: le_u32(b, 12),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.nblocks.to_le_bytes());
        out[8..12].copy_from_slice(&self.ninodes.to_le_bytes());
        out[12..16].copy_from_slice(&self.nlog.to_le_bytes());
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiskInode {
    /// Tipo crudo; se valida con [`InodeType::from_raw`].
    pub kind: i16,
    pub major: i16,
    pub minor: i16,
    pub nlink: i16,
    pub size: u32,
    /// `NDIRECT` punteros directos seguidos del puntero indirecto.
    pub addrs: [u32; NDIRECT + 1],
}

impl DiskInode {
    pub fn decode(b: &[u8]) -> Self {
        let mut addrs = [0u32; NDIRECT + 1];
        for (i, a) in addrs.iter_mut().enumerate() {
            *a = le_u32(b, 12 + i * 4);
        }
        Self {
            kind: le_i16(b, 0),
            major: le_i16(b, 2),
            minor: le_i16(b, 4),
            nlink: le_i16(b, 6),
            size: le_u32(b, 8),
            addrs,
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.kind.to_le_bytes());
        out[2..4].copy_from_slice(&self.major.to_le_bytes());
        out[4..6].copy_from_slice(&self.minor.to_le_bytes());
        out[6..8].copy_from_slice(&self.nlink.to_le_bytes());
        out[8..12].copy_from_slice(&self.size.to_le_bytes());
        for (i, a) in self.addrs.iter().enumerate() {
            out[12 + i * 4..16 + i * 4].copy_from_slice(&a.to_le_bytes());
        }
    }

    pub fn inode_type(&self) -> Option<InodeType> {
        InodeType::from_raw(self.kind)
    }

    pub fn is(&self, kind: InodeType) -> bool {
        self.kind == kind.as_raw()
    }

    pub fn indirect(&self) -> u32 {
        self.addrs[NDIRECT]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirEntryDisk {
    pub inum: u16,
    pub name: [u8; DIRSIZ],
}

impl DirEntryDisk {
    pub fn new(inum: u16, name: &str) -> Self {
        let mut raw = [0u8; DIRSIZ];
        let n = name.len().min(DIRSIZ);
        raw[..n].copy_from_slice(&name.as_bytes()[..n]);
        Self { inum, name: raw }
    }

    pub fn decode(b: &[u8]) -> Self {
        let mut name = [0u8; DIRSIZ];
        name.copy_from_slice(&b[2..2 + DIRSIZ]);
        Self {
            inum: le_u16(b, 0),
            name,
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.inum.to_le_bytes());
        out[2..2 + DIRSIZ].copy_from_slice(&self.name);
    }

    /// Nombre hasta el primer NUL (o los 14 bytes completos).
    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&c| c == 0).unwrap_or(DIRSIZ);
        &self.name[..end]
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }
}

// -----------------------------------------------------------------------------
// Geometría derivada del superblock
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub size: u32,
    pub ninodes: u32,
    pub inode_blocks: u32,
    pub bitmap_start: u32,
    pub bitmap_blocks: u32,
    /// Primer bloque válido de la región de datos.
    pub meta_blocks: u32,
}

impl Geometry {
    pub fn new(size: u32, ninodes: u32) -> Self {
        let inode_blocks = ninodes / IPB + 1;
        let bitmap_blocks = size / BPB + 1;
        let bitmap_start = INODE_START + inode_blocks;
        Self {
            size,
            ninodes,
            inode_blocks,
            bitmap_start,
            bitmap_blocks,
            meta_blocks: bitmap_start + bitmap_blocks,
        }
    }

    pub fn is_data_block(&self, bno: u32) -> bool {
        bno >= self.meta_blocks && bno < self.size
    }
}

fn block_range(start: u32, count: u32) -> Option<Range<usize>> {
    let start = (start as usize).checked_mul(BSIZE)?;
    let len = (count as usize).checked_mul(BSIZE)?;
    Some(start..start.checked_add(len)?)
}

// -----------------------------------------------------------------------------
// Vista tipada y con verificación de límites sobre los bytes de la imagen
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct Image<'a> {
    data: &'a [u8],
    superblock: Superblock,
    geometry: Geometry,
}

impl<'a> Image<'a> {
    /// Lee el superblock y comprueba que todos los bloques de metadata
    /// (inodos y bitmap) caben en `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self, FsckError> {
        let sb_off = SUPERBLOCK_BLOCK as usize * BSIZE;
        let sb_bytes = checked_slice(data, sb_off..sb_off + Superblock::DISK_SIZE, "superblock")?;
        let superblock = Superblock::decode(sb_bytes);
        let geometry = Geometry::new(superblock.size, superblock.ninodes);

        let meta = block_range(0, geometry.meta_blocks).ok_or(FsckError::TruncatedImage {
            what: "bloques de metadata",
            start: 0,
            end: usize::MAX,
            len: data.len(),
        })?;
        checked_slice(data, meta, "bloques de metadata")?;

        log::debug!(
            "geometría: size={} ninodes={} inode_blocks={} bitmap_blocks={} meta_blocks={}",
            geometry.size,
            geometry.ninodes,
            geometry.inode_blocks,
            geometry.bitmap_blocks,
            geometry.meta_blocks
        );

        Ok(Self {
            data,
            superblock,
            geometry,
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn ninodes(&self) -> u32 {
        self.superblock.ninodes
    }

    pub fn block(&self, bno: u32) -> Result<&'a [u8], FsckError> {
        let range = block_range(bno, 1).ok_or(FsckError::TruncatedImage {
            what: "bloque",
            start: usize::MAX,
            end: usize::MAX,
            len: self.data.len(),
        })?;
        checked_slice(self.data, range, "bloque de datos")
    }

    /// Lee el inodo `inum`. Los índices fuera de `ninodes` son un error.
    pub fn inode(&self, inum: u32) -> Result<DiskInode, FsckError> {
        if inum >= self.superblock.ninodes {
            return Err(FsckError::TruncatedImage {
                what: "inodo fuera de la tabla",
                start: inum as usize,
                end: inum as usize + 1,
                len: self.superblock.ninodes as usize,
            });
        }
        let off = INODE_START as usize * BSIZE + inum as usize * DINODE_SIZE;
        let bytes = checked_slice(self.data, off..off + DINODE_SIZE, "inodo")?;
        Ok(DiskInode::decode(bytes))
    }

    /// Bitmap de bloques autoritativo, tal como está en disco.
    pub fn block_bitmap(&self) -> &'a [u8] {
        let start = self.geometry.bitmap_start as usize * BSIZE;
        let end = start + self.geometry.bitmap_blocks as usize * BSIZE;
        // `parse` ya verificó que toda la metadata está dentro de `data`.
        &self.data[start..end]
    }

    /// Interpreta el bloque `bno` como arreglo de punteros a bloque.
    pub fn indirect_addrs(&self, bno: u32) -> Result<[u32; NINDIRECT], FsckError> {
        let block = self.block(bno)?;
        let mut addrs = [0u32; NINDIRECT];
        for (i, a) in addrs.iter_mut().enumerate() {
            *a = le_u32(block, i * 4);
        }
        Ok(addrs)
    }
}

fn checked_slice<'a>(
    data: &'a [u8],
    range: Range<usize>,
    what: &'static str,
) -> Result<&'a [u8], FsckError> {
    data.get(range.clone()).ok_or(FsckError::TruncatedImage {
        what,
        start: range.start,
        end: range.end,
        len: data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_matches_xv6_mkfs() {
        let geo = Geometry::new(1024, 200);
        assert_eq!(geo.inode_blocks, 26);
        assert_eq!(geo.bitmap_start, 28);
        assert_eq!(geo.bitmap_blocks, 1);
        assert_eq!(geo.meta_blocks, 200 / IPB + 3 + 1);
        assert!(!geo.is_data_block(28));
        assert!(geo.is_data_block(29));
        assert!(!geo.is_data_block(1024));
    }

    #[test]
    fn inode_type_rejects_unknown_values() {
        assert_eq!(InodeType::from_raw(1), Some(InodeType::Dir));
        assert_eq!(InodeType::from_raw(3), Some(InodeType::Device));
        assert_eq!(InodeType::from_raw(4), None);
        assert_eq!(InodeType::from_raw(-1), None);
    }

    #[test]
    fn dirent_name_stops_at_nul() {
        let de = DirEntryDisk::new(7, "..");
        assert_eq!(de.name_bytes(), b"..");

        let full = DirEntryDisk::new(3, "abcdefghijklmnopq");
        assert_eq!(full.name_bytes(), b"abcdefghijklmn");

        let mut raw = [0u8; DIRENT_SIZE];
        de.encode(&mut raw);
        assert_eq!(DirEntryDisk::decode(&raw), de);
    }

    #[test]
    fn inode_layout_is_64_bytes() {
        let mut ino = DiskInode {
            kind: 2,
            nlink: 1,
            size: 700,
            ..Default::default()
        };
        ino.addrs[0] = 40;
        ino.addrs[NDIRECT] = 41;

        let mut raw = [0u8; DINODE_SIZE];
        ino.encode(&mut raw);
        assert_eq!(&raw[12..16], &40u32.to_le_bytes());
        assert_eq!(&raw[60..64], &41u32.to_le_bytes());
        assert_eq!(DiskInode::decode(&raw).indirect(), 41);
    }

    #[test]
    fn parse_rejects_image_without_superblock() {
        let data = vec![0u8; BSIZE];
        assert!(matches!(
            Image::parse(&data),
            Err(FsckError::TruncatedImage { what: "superblock", .. })
        ));
    }

    #[test]
    fn parse_rejects_missing_metadata() {
        let mut data = vec![0u8; 4 * BSIZE];
        let sb = Superblock {
            size: 1024,
            nblocks: 0,
            ninodes: 200,
            nlog: 0,
        };
        sb.encode(&mut data[BSIZE..]);
        assert!(matches!(
            Image::parse(&data),
            Err(FsckError::TruncatedImage { what: "bloques de metadata", .. })
        ));
    }

    #[test]
    fn data_block_past_end_is_reported() {
        let mut data = vec![0u8; 8 * BSIZE];
        let sb = Superblock {
            size: 100,
            nblocks: 0,
            ninodes: 8,
            nlog: 0,
        };
        sb.encode(&mut data[BSIZE..]);
        let image = Image::parse(&data).unwrap();
        assert!(image.block(7).is_ok());
        assert!(matches!(image.block(50), Err(FsckError::TruncatedImage { .. })));
        assert!(matches!(image.inode(8), Err(FsckError::TruncatedImage { .. })));
    }
}
