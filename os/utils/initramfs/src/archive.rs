use crate::{EntryHeader, HEADER_LEN, InitramfsError, MAX_ENTRIES, padded_len};

/// One file inside an [`Initramfs`], borrowing the archive blob.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct File<'a> {
    name: &'a str,
    data: &'a [u8],
}

impl<'a> File<'a> {
    const EMPTY: Self = Self { name: "", data: &[] };

    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    #[must_use]
    pub const fn bytes(&self) -> &'a [u8] {
        self.data
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy up to `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// Returns the number of bytes copied; `0` at or past the end of the file.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        let Some(rest) = self.data.get(offset..) else {
            return 0;
        };
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        n
    }
}

/// Parsed view over an archive blob. Holds at most [`MAX_ENTRIES`] files.
#[derive(Debug, Clone)]
pub struct Initramfs<'a> {
    files: [File<'a>; MAX_ENTRIES],
    len: usize,
}

impl<'a> Initramfs<'a> {
    /// Parse and validate an archive.
    ///
    /// Parsing stops at a terminator header or when fewer than a header's
    /// worth of bytes remain.
    ///
    /// # Errors
    /// - [`InitramfsError::Truncated`] if a file's data runs past the blob.
    /// - [`InitramfsError::InvalidName`] for names that are not UTF-8.
    /// - [`InitramfsError::TooManyEntries`] past [`MAX_ENTRIES`] files.
    pub fn parse(blob: &'a [u8]) -> Result<Self, InitramfsError> {
        let mut archive = Self {
            files: [File::EMPTY; MAX_ENTRIES],
            len: 0,
        };

        let mut cursor = 0usize;
        while let Some(raw) = cursor
            .checked_add(HEADER_LEN)
            .and_then(|end| blob.get(cursor..end))
            .and_then(|s| <&[u8; HEADER_LEN]>::try_from(s).ok())
        {
            let header = EntryHeader::from_bytes(raw);
            if header.is_terminator() {
                break;
            }
            let index = archive.len;
            if index == MAX_ENTRIES {
                return Err(InitramfsError::TooManyEntries);
            }

            let start = cursor + HEADER_LEN;
            let end = start
                .checked_add(header.size() as usize)
                .ok_or(InitramfsError::Truncated(index))?;
            let data = blob.get(start..end).ok_or(InitramfsError::Truncated(index))?;

            // Borrow the name from the blob, not from the header copy.
            let name_len = header.name_bytes().len();
            let name = core::str::from_utf8(&blob[cursor..cursor + name_len])
                .map_err(|_| InitramfsError::InvalidName(index))?;

            archive.files[index] = File { name, data };
            archive.len += 1;
            cursor = start.saturating_add(padded_len(header.size()));
        }

        Ok(archive)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Find a file by its exact path.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<File<'a>> {
        self.iter().find(|f| f.name == path)
    }

    /// Files in archive order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = File<'a>> + '_ {
        self.files[..self.len].iter().copied()
    }
}
