//! # Archivos Mapeados en Memoria
//! src/http/mmap.rs
//!
//! Mapeo privado de solo lectura de un archivo completo. El mapeo se
//! libera en `Drop`, así ningún camino de salida (respuesta completa, error
//! de escritura, cierre de la conexión) puede dejarlo colgado.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;

pub struct MappedFile {
    addr: *mut libc::c_void,
    len: usize,
}

// SAFETY: el mapeo es de solo lectura y solo se libera en Drop
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl MappedFile {
    /// Mapea `path` entero. Los archivos vacíos no se pueden mapear.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty file",
            ));
        }

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
            return Err(io::Error::last_os_error());
        }

        // El descriptor se cierra aquí; el mapeo sigue válido
        Ok(Self { addr, len })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.addr as *const u8, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.addr, self.len);
        }
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_maps_file_contents() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"<h1>hola</h1>").unwrap();
        file.flush().unwrap();

        let mapped = MappedFile::open(file.path()).unwrap();
        assert_eq!(mapped.len(), 13);
        assert_eq!(mapped.as_slice(), b"<h1>hola</h1>");
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let err = MappedFile::open(file.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_missing_file() {
        let err = MappedFile::open(Path::new("/definitely/not/here.html")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
