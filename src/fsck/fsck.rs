/*Punto de entrada del fsck. Encadena las tres etapas:
cargar la imagen, validar cada inodo (recorriendo directorios en línea)
y reconciliar bitmaps y contadores. La primera violación detiene todo. */
use std::path::Path;

use crate::fs::Image;
use crate::mmap::Mmap;

use super::fsck_types::{FsckResult, FsckState};
use super::{inode, reconcile};

pub struct Checker<'i, 'a> {
    image: &'i Image<'a>,
    state: FsckState,
}

impl<'i, 'a> Checker<'i, 'a> {
    pub fn new(image: &'i Image<'a>) -> FsckResult<Self> {
        Ok(Self {
            image,
            state: FsckState::new(image)?,
        })
    }

    /// Valida todos los inodos en orden creciente y luego reconcilia.
    pub fn run(mut self) -> FsckResult {
        self.check_inodes()?;
        self.reconcile()
    }

    pub fn check_inodes(&mut self) -> FsckResult {
        for inum in 0..self.image.ninodes() {
            inode::check_inode(self.image, &mut self.state, inum)?;
        }
        Ok(())
    }

    pub fn reconcile(&self) -> FsckResult {
        reconcile::reconcile(self.image, &self.state)
    }

    pub fn state(&self) -> &FsckState {
        &self.state
    }
}

/// Chequea una imagen ya cargada en memoria.
pub fn check_image(bytes: &[u8]) -> FsckResult {
    let image = Image::parse(bytes)?;
    Checker::new(&image)?.run()
}

/// Mapea el archivo en `path` y lo chequea.
pub fn check_path(path: &Path) -> FsckResult {
    let map = Mmap::open(path)?;
    check_image(&map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{InodeType, ROOTINO};
    use crate::fsck::FsckError;
    use crate::mkfs::ImageBuilder;

    /// 200 inodos, raíz con un archivo "a" (nlink 1, un bloque directo).
    fn scenario() -> (ImageBuilder, u32) {
        let mut b = ImageBuilder::new(1024, 200).unwrap();
        let f = b.create_file(ROOTINO, "a", b"contenido").unwrap();
        (b, f)
    }

    #[test]
    fn empty_filesystem_is_clean() {
        let b = ImageBuilder::new(1024, 200).unwrap();
        check_image(&b.into_bytes()).unwrap();
    }

    #[test]
    fn single_file_image_is_clean() {
        let (b, f) = scenario();
        let ino = b.inode(f).unwrap();
        assert_eq!(ino.nlink, 1);
        assert_ne!(ino.addrs[0], 0);
        assert_eq!(ino.addrs[1], 0);
        check_image(&b.into_bytes()).unwrap();
    }

    #[test]
    fn clearing_the_file_block_bit_is_reported() {
        let (mut b, f) = scenario();
        let blk = b.inode(f).unwrap().addrs[0];
        b.set_bitmap_bit(blk, false);
        let err = check_image(&b.into_bytes()).unwrap_err();
        assert!(matches!(err, FsckError::AddressNotMarkedUsed { inum, addr } if inum == f && addr == blk));
    }

    #[test]
    fn dropping_the_pointer_leaks_the_block() {
        let (mut b, f) = scenario();
        let blk = b.inode(f).unwrap().addrs[0];
        b.update_inode(f, |ino| ino.addrs[0] = 0).unwrap();
        let err = check_image(&b.into_bytes()).unwrap_err();
        assert!(matches!(err, FsckError::LeakedBlock { block } if block == blk));
    }

    #[test]
    fn directory_linked_from_two_parents() {
        let mut b = ImageBuilder::new(1024, 200).unwrap();
        let d1 = b.mkdir(ROOTINO, "d1").unwrap();
        let d2 = b.mkdir(ROOTINO, "d2").unwrap();
        b.link(d2, "b", d1).unwrap();
        let err = check_image(&b.into_bytes()).unwrap_err();
        assert!(matches!(
            err,
            FsckError::DuplicateDirectoryLink { dir, target } if dir == d2 && target == d1
        ));
    }

    #[test]
    fn nested_tree_with_large_file_is_clean() {
        let mut b = ImageBuilder::new(2000, 64).unwrap();
        let usr = b.mkdir(ROOTINO, "usr").unwrap();
        let bin = b.mkdir(usr, "bin").unwrap();
        let big = vec![0xabu8; 40 * crate::fs::BSIZE + 17];
        let f = b.create_file(bin, "programa", &big).unwrap();
        b.link(ROOTINO, "atajo", f).unwrap();
        let dev = b.alloc_inode(InodeType::Device).unwrap();
        b.link(ROOTINO, "consola", dev).unwrap();

        let bytes = b.into_bytes();
        let image = Image::parse(&bytes).unwrap();
        let mut checker = Checker::new(&image).unwrap();
        checker.check_inodes().unwrap();
        assert_eq!(checker.state().references(f), 2);
        checker.reconcile().unwrap();
    }

    #[test]
    fn check_path_reads_file() {
        use std::io::Write;

        let (b, _) = scenario();
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&b.into_bytes()).unwrap();
        tmp.flush().unwrap();
        check_path(tmp.path()).unwrap();
    }
}
