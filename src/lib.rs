mod bitmap;
mod dir;
mod fs;
mod mkfs;
mod mmap;
pub mod fsck;

pub use crate::bitmap::{BitmapOps, ShadowBitmap};
pub use crate::dir::{block_addresses, check_directory, directory_entries};
pub use crate::fs::{
    DirEntryDisk,
    DiskInode,
    Geometry,
    Image,
    InodeType,
    Superblock,
    BSIZE,
    DIRSIZ,
    NDIRECT,
    NINDIRECT,
    ROOTINO,
};
pub use crate::fsck::{check_image, check_path, FsckError};
pub use crate::mkfs::ImageBuilder;
pub use crate::mmap::Mmap;
