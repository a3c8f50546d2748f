//! # Initramfs archive format
//!
//! A flat, read-only archive of named files, loaded by the boot loader as a
//! module and used as the root file system.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ name: [u8; 64], NUL-padded   │  EntryHeader
//! │ size: u32, little-endian     │
//! ├──────────────────────────────┤
//! │ size bytes of file data      │
//! │ zero padding to 4 bytes      │
//! ├──────────────────────────────┤
//! │ ... next entry ...           │
//! ├──────────────────────────────┤
//! │ terminator (size 0 or empty  │
//! │ name), or end of the blob    │
//! └──────────────────────────────┘
//! ```
//!
//! The header layer is always available so host tools can write archives;
//! the `reader` feature adds the borrowed, allocation-free [`Initramfs`] view.

#![cfg_attr(not(any(test, doctest)), no_std)]

#[cfg(feature = "reader")]
mod archive;

#[cfg(feature = "reader")]
pub use archive::{File, Initramfs};

/// Bytes reserved for the NUL-padded file name.
pub const NAME_LEN: usize = 64;

/// Size of one encoded [`EntryHeader`].
pub const HEADER_LEN: usize = NAME_LEN + 4;

/// File data is padded to this alignment.
pub const DATA_ALIGN: usize = 4;

/// Maximum number of files in one archive.
pub const MAX_ENTRIES: usize = 32;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum InitramfsError {
    #[error("file name is empty")]
    EmptyName,
    #[error("file name is {0} bytes, at most {max} fit", max = NAME_LEN - 1)]
    NameTooLong(usize),
    #[error("file name contains a NUL byte")]
    NulInName,
    #[error("file name of entry {0} is not valid UTF-8")]
    InvalidName(usize),
    #[error("file of {0} bytes does not fit the 32-bit size field")]
    FileTooLarge(usize),
    #[error("entry {0} runs past the end of the archive")]
    Truncated(usize),
    #[error("archive holds more than {MAX_ENTRIES} files")]
    TooManyEntries,
}

/// Fixed-size header in front of every file.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct EntryHeader {
    name: [u8; NAME_LEN],
    size: u32,
}

impl EntryHeader {
    /// Header for a file called `name` holding `size` bytes.
    ///
    /// The name must leave room for a terminating NUL.
    ///
    /// # Errors
    /// Empty names, names containing NUL and names of 64 bytes or more.
    pub fn new(name: &str, size: usize) -> Result<Self, InitramfsError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() {
            return Err(InitramfsError::EmptyName);
        }
        if bytes.len() >= NAME_LEN {
            return Err(InitramfsError::NameTooLong(bytes.len()));
        }
        if bytes.contains(&0) {
            return Err(InitramfsError::NulInName);
        }
        let size = u32::try_from(size).map_err(|_| InitramfsError::FileTooLarge(size))?;

        let mut header = Self::terminator();
        header.name[..bytes.len()].copy_from_slice(bytes);
        header.size = size;
        Ok(header)
    }

    /// The all-zero header closing an archive.
    #[must_use]
    pub const fn terminator() -> Self {
        Self {
            name: [0; NAME_LEN],
            size: 0,
        }
    }

    #[must_use]
    pub fn from_bytes(raw: &[u8; HEADER_LEN]) -> Self {
        let mut name = [0; NAME_LEN];
        name.copy_from_slice(&raw[..NAME_LEN]);
        let size = u32::from_le_bytes([
            raw[NAME_LEN],
            raw[NAME_LEN + 1],
            raw[NAME_LEN + 2],
            raw[NAME_LEN + 3],
        ]);
        Self { name, size }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut raw = [0; HEADER_LEN];
        raw[..NAME_LEN].copy_from_slice(&self.name);
        raw[NAME_LEN..].copy_from_slice(&self.size.to_le_bytes());
        raw
    }

    /// Name bytes up to the first NUL.
    #[must_use]
    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &self.name[..end]
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// A zero size or an empty name ends the archive.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        self.size == 0 || self.name[0] == 0
    }
}

impl core::fmt::Debug for EntryHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntryHeader")
            .field("name", &core::str::from_utf8(self.name_bytes()))
            .field("size", &self.size)
            .finish()
    }
}

/// Number of data bytes (including padding) that follow a header for a file
/// of `size` bytes.
#[must_use]
pub const fn padded_len(size: u32) -> usize {
    (size as usize).next_multiple_of(DATA_ALIGN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let raw = EntryHeader::new("bin/init", 0x0102_0304).unwrap().to_bytes();
        assert_eq!(&raw[..8], b"bin/init");
        assert!(raw[8..NAME_LEN].iter().all(|&b| b == 0));
        assert_eq!(&raw[NAME_LEN..], &[4, 3, 2, 1]);
    }

    #[test]
    fn names_must_fit_with_terminator() {
        let longest = "a".repeat(NAME_LEN - 1);
        assert!(EntryHeader::new(&longest, 1).is_ok());
        assert_eq!(
            EntryHeader::new(&"a".repeat(NAME_LEN), 1),
            Err(InitramfsError::NameTooLong(NAME_LEN))
        );
        assert_eq!(EntryHeader::new("", 1), Err(InitramfsError::EmptyName));
        assert_eq!(EntryHeader::new("a\0b", 1), Err(InitramfsError::NulInName));
    }

    #[test]
    fn terminators() {
        assert!(EntryHeader::terminator().is_terminator());
        assert!(EntryHeader::new("empty", 0).unwrap().is_terminator());
        assert!(!EntryHeader::new("x", 1).unwrap().is_terminator());
    }

    #[test]
    fn padding_rounds_to_four() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 4);
        assert_eq!(padded_len(4), 4);
        assert_eq!(padded_len(5), 8);
    }
}
