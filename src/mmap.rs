// src/mmap.rs
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::slice;

use crate::fsck::FsckError;

/// Mapeo de solo lectura de un archivo completo.
///
/// El descriptor se cierra al terminar `open`; el mapeo sigue vivo hasta el
/// `Drop`.
#[derive(Debug)]
pub struct Mmap {
    ptr: NonNull<u8>,
    len: usize,
}

impl Mmap {
    pub fn open(path: &Path) -> Result<Self, FsckError> {
        let file = File::open(path).map_err(|source| FsckError::Io {
            action: "no se pudo abrir la imagen",
            path: path.to_path_buf(),
            source,
        })?;

        let len = file
            .metadata()
            .map_err(|source| FsckError::Io {
                action: "no se pudo obtener el tamaño de la imagen",
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let len = usize::try_from(len).map_err(|_| FsckError::Map {
            path: path.to_path_buf(),
            source: io::Error::from(io::ErrorKind::InvalidInput),
        })?;

        // SAFETY: mapeo PROT_READ/MAP_PRIVATE de un descriptor válido; el
        // resultado se verifica contra MAP_FAILED antes de usarse.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(FsckError::Map {
                path: path.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }

        let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| FsckError::Map {
            path: path.to_path_buf(),
            source: io::Error::from(io::ErrorKind::Other),
        })?;

        log::debug!("imagen {:?} mapeada ({} bytes)", path, len);
        Ok(Self { ptr, len })
    }
}

impl Deref for Mmap {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: `ptr` apunta a `len` bytes mapeados que viven hasta `Drop`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Mmap {
    fn drop(&mut self) {
        // SAFETY: mismo puntero y largo devueltos por mmap.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}
