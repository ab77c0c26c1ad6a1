use anyhow::{anyhow, bail, Context, Result};

use crate::bitmap::BitmapOps;
use crate::fs::{
    DirEntryDisk, DiskInode, Geometry, InodeType, Superblock, BSIZE, DINODE_SIZE, DIRENT_SIZE,
    DIRSIZ, INODE_START, MAXFILE, NDIRECT, ROOTINO, SUPERBLOCK_BLOCK,
};

/// Construye en memoria una imagen consistente: superblock, tabla de
/// inodos, bitmap y directorio raíz con "." y "..".
///
/// Los inodos y bloques se asignan en orden creciente. Además de las
/// operaciones normales (`mkdir`, `create_file`, `link`) expone mutadores
/// crudos para fabricar imágenes rotas.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    bytes: Vec<u8>,
    geometry: Geometry,
    next_inum: u32,
    next_block: u32,
}

impl ImageBuilder {
    pub fn new(size: u32, ninodes: u32) -> Result<Self> {
        if ninodes <= ROOTINO {
            bail!("Se requieren al menos {} inodos (se pidieron {}).", ROOTINO + 1, ninodes);
        }
        if ninodes > u32::from(u16::MAX) + 1 {
            bail!("Las entradas de directorio sólo direccionan {} inodos.", u32::from(u16::MAX) + 1);
        }

        let geometry = Geometry::new(size, ninodes);
        if geometry.meta_blocks >= size {
            bail!(
                "No hay espacio para bloques de datos: size={}, meta_blocks={}",
                size,
                geometry.meta_blocks
            );
        }

        let len = (size as usize)
            .checked_mul(BSIZE)
            .ok_or_else(|| anyhow!("Imagen demasiado grande: {} bloques", size))?;

        let mut builder = Self {
            bytes: vec![0u8; len],
            geometry,
            next_inum: ROOTINO,
            next_block: geometry.meta_blocks,
        };

        let superblock = Superblock {
            size,
            nblocks: size - geometry.meta_blocks,
            ninodes,
            nlog: 0,
        };
        let sb_off = SUPERBLOCK_BLOCK as usize * BSIZE;
        superblock.encode(&mut builder.bytes[sb_off..sb_off + Superblock::DISK_SIZE]);

        // Los bloques de metadata quedan marcados como usados.
        for blk in 0..geometry.meta_blocks {
            builder.set_bitmap_bit(blk, true);
        }

        let root = builder.alloc_inode(InodeType::Dir)?;
        builder.link(root, ".", root)?;
        builder.link(root, "..", root)?;

        Ok(builder)
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    // -------------------- Inodos --------------------

    pub fn alloc_inode(&mut self, kind: InodeType) -> Result<u32> {
        let inum = self.next_inum;
        if inum >= self.geometry.ninodes {
            bail!("No quedan inodos libres ({} en total).", self.geometry.ninodes);
        }
        self.next_inum += 1;

        // Los archivos suman enlaces a medida que se nombran en `link`.
        let nlink = if kind == InodeType::File { 0 } else { 1 };
        self.write_inode(
            inum,
            &DiskInode {
                kind: kind.as_raw(),
                nlink,
                ..Default::default()
            },
        )?;
        Ok(inum)
    }

    pub fn inode(&self, inum: u32) -> Result<DiskInode> {
        let off = self.inode_offset(inum)?;
        Ok(DiskInode::decode(&self.bytes[off..off + DINODE_SIZE]))
    }

    pub fn update_inode(&mut self, inum: u32, f: impl FnOnce(&mut DiskInode)) -> Result<()> {
        let mut ino = self.inode(inum)?;
        f(&mut ino);
        self.write_inode(inum, &ino)
    }

    fn write_inode(&mut self, inum: u32, ino: &DiskInode) -> Result<()> {
        let off = self.inode_offset(inum)?;
        ino.encode(&mut self.bytes[off..off + DINODE_SIZE]);
        Ok(())
    }

    fn inode_offset(&self, inum: u32) -> Result<usize> {
        if inum >= self.geometry.ninodes {
            bail!("Inodo {} fuera de rango (ninodes = {}).", inum, self.geometry.ninodes);
        }
        Ok(INODE_START as usize * BSIZE + inum as usize * DINODE_SIZE)
    }

    // -------------------- Bloques --------------------

    pub fn alloc_block(&mut self) -> Result<u32> {
        let blk = self.next_block;
        if blk >= self.geometry.size {
            bail!("No quedan bloques de datos libres.");
        }
        self.next_block += 1;
        self.set_bitmap_bit(blk, true);
        Ok(blk)
    }

    pub fn set_bitmap_bit(&mut self, block: u32, used: bool) {
        let start = self.geometry.bitmap_start as usize * BSIZE;
        let end = start + self.geometry.bitmap_blocks as usize * BSIZE;
        let bitmap = &mut self.bytes[start..end];
        if used {
            bitmap.set_bit(block as usize);
        } else {
            bitmap.clear_bit(block as usize);
        }
    }

    fn block_mut(&mut self, bno: u32) -> Result<&mut [u8]> {
        let start = bno as usize * BSIZE;
        self.bytes
            .get_mut(start..start + BSIZE)
            .with_context(|| format!("Bloque {} fuera de la imagen", bno))
    }

    /// Escribe `addr` en la posición `index` del bloque indirecto `indirect`.
    pub fn write_indirect_entry(&mut self, indirect: u32, index: usize, addr: u32) -> Result<()> {
        let block = self.block_mut(indirect)?;
        let slot = block
            .get_mut(index * 4..index * 4 + 4)
            .with_context(|| format!("Índice indirecto {} fuera de rango", index))?;
        slot.copy_from_slice(&addr.to_le_bytes());
        Ok(())
    }

    pub fn read_indirect_entry(&self, indirect: u32, index: usize) -> Result<u32> {
        let off = indirect as usize * BSIZE + index * 4;
        let raw = self
            .bytes
            .get(off..off + 4)
            .filter(|_| index < crate::fs::NINDIRECT)
            .with_context(|| format!("Entrada indirecta {}:{} fuera de la imagen", indirect, index))?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Bloque lógico `index` del inodo; lo asigna (y el indirecto) si falta.
    fn block_for(&mut self, inum: u32, index: usize) -> Result<u32> {
        if index >= MAXFILE {
            bail!("El inodo {} superaría el tamaño máximo de archivo.", inum);
        }
        let ino = self.inode(inum)?;

        if index < NDIRECT {
            if ino.addrs[index] != 0 {
                return Ok(ino.addrs[index]);
            }
            let blk = self.alloc_block()?;
            self.update_inode(inum, |ino| ino.addrs[index] = blk)?;
            return Ok(blk);
        }

        let mut indirect = ino.indirect();
        if indirect == 0 {
            indirect = self.alloc_block()?;
            self.update_inode(inum, |ino| ino.addrs[NDIRECT] = indirect)?;
        }

        let slot = index - NDIRECT;
        match self.read_indirect_entry(indirect, slot)? {
            0 => {
                let blk = self.alloc_block()?;
                self.write_indirect_entry(indirect, slot, blk)?;
                Ok(blk)
            }
            blk => Ok(blk),
        }
    }

    /// Escribe `data` a partir del offset `off` del inodo y ajusta `size`
    /// si el archivo crece.
    fn write_at(&mut self, inum: u32, mut off: usize, data: &[u8]) -> Result<()> {
        let end = off + data.len();
        let mut rest = data;

        while !rest.is_empty() {
            let blk = self.block_for(inum, off / BSIZE)?;
            let within = off % BSIZE;
            let n = rest.len().min(BSIZE - within);
            self.block_mut(blk)?[within..within + n].copy_from_slice(&rest[..n]);
            off += n;
            rest = &rest[n..];
        }

        let end = u32::try_from(end).context("Archivo demasiado grande")?;
        self.update_inode(inum, |ino| ino.size = ino.size.max(end))
    }

    pub fn append(&mut self, inum: u32, data: &[u8]) -> Result<()> {
        let off = self.inode(inum)?.size as usize;
        self.write_at(inum, off, data)
    }

    // -------------------- Directorios --------------------

    /// Agrega la entrada `name -> inum` al directorio `dir`. Si el destino
    /// es un archivo regular, incrementa su nlink.
    pub fn link(&mut self, dir: u32, name: &str, inum: u32) -> Result<()> {
        if !self.inode(dir)?.is(InodeType::Dir) {
            bail!("El inodo {} no es un directorio.", dir);
        }
        if name.len() > DIRSIZ {
            bail!("Nombre {:?} más largo que {} bytes.", name, DIRSIZ);
        }
        let inum16 = u16::try_from(inum).context("Número de inodo fuera de rango")?;

        let mut raw = [0u8; DIRENT_SIZE];
        DirEntryDisk::new(inum16, name).encode(&mut raw);
        self.append(dir, &raw)?;

        let target = self.inode(inum)?;
        if target.is(InodeType::File) {
            let nlink = target
                .nlink
                .checked_add(1)
                .context("Demasiados enlaces al mismo archivo")?;
            self.update_inode(inum, |ino| ino.nlink = nlink)?;
        }
        Ok(())
    }

    /// Sobrescribe la entrada `index` de `dir`, extendiendo el directorio con
    /// entradas vacías si hace falta. No toca ningún nlink.
    pub fn write_dirent(&mut self, dir: u32, index: usize, name: &str, inum: u16) -> Result<()> {
        let mut raw = [0u8; DIRENT_SIZE];
        DirEntryDisk::new(inum, name).encode(&mut raw);
        self.write_at(dir, index * DIRENT_SIZE, &raw)
    }

    pub fn mkdir(&mut self, parent: u32, name: &str) -> Result<u32> {
        let dir = self.alloc_inode(InodeType::Dir)?;
        self.link(dir, ".", dir)?;
        self.link(dir, "..", parent)?;
        self.link(parent, name, dir)?;
        Ok(dir)
    }

    pub fn create_file(&mut self, dir: u32, name: &str, data: &[u8]) -> Result<u32> {
        let file = self.alloc_inode(InodeType::File)?;
        self.append(file, data)?;
        self.link(dir, name, file)?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Image, EPB};

    #[test]
    fn fresh_image_has_root_directory() {
        let b = ImageBuilder::new(1024, 200).unwrap();
        let root = b.inode(ROOTINO).unwrap();
        assert!(root.is(InodeType::Dir));
        assert_eq!(root.size as usize, 2 * DIRENT_SIZE);
        assert_eq!(root.addrs[0], b.geometry().meta_blocks);

        let bytes = b.into_bytes();
        let image = Image::parse(&bytes).unwrap();
        assert_eq!(image.superblock().size, 1024);
        assert_eq!(image.superblock().ninodes, 200);
        assert_eq!(image.inode(0).unwrap().kind, 0);
    }

    #[test]
    fn large_file_uses_indirect_block() {
        let mut b = ImageBuilder::new(1024, 200).unwrap();
        let data = vec![1u8; (NDIRECT + 3) * BSIZE];
        let f = b.create_file(ROOTINO, "grande", &data).unwrap();
        let ino = b.inode(f).unwrap();
        assert!(ino.addrs[..NDIRECT].iter().all(|&a| a != 0));
        assert_ne!(ino.indirect(), 0);
        assert_eq!(ino.size as usize, data.len());
        assert_ne!(b.read_indirect_entry(ino.indirect(), 2).unwrap(), 0);
        assert_eq!(b.read_indirect_entry(ino.indirect(), 3).unwrap(), 0);
        assert!(b.read_indirect_entry(ino.indirect(), crate::fs::NINDIRECT).is_err());
    }

    #[test]
    fn write_dirent_extends_directory() {
        let mut b = ImageBuilder::new(1024, 200).unwrap();
        b.write_dirent(ROOTINO, EPB, "x", 0).unwrap();
        let root = b.inode(ROOTINO).unwrap();
        assert_eq!(root.size as usize, (EPB + 1) * DIRENT_SIZE);
        assert_ne!(root.addrs[1], 0);
    }

    #[test]
    fn rejects_geometry_without_data_region() {
        assert!(ImageBuilder::new(10, 200).is_err());
        assert!(ImageBuilder::new(1024, 1).is_err());
    }

    #[test]
    fn runs_out_of_inodes() {
        let mut b = ImageBuilder::new(1024, 3).unwrap();
        b.alloc_inode(InodeType::File).unwrap();
        assert!(b.alloc_inode(InodeType::File).is_err());
    }
}
