use initramfs::Initramfs;

/// Read-only lookup of whole files by path, as used by `execve`.
pub trait FileLookup {
    fn lookup(&self, path: &str) -> Option<&[u8]>;
}

impl FileLookup for Initramfs<'_> {
    fn lookup(&self, path: &str) -> Option<&[u8]> {
        Self::lookup(self, path).map(|f| f.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use initramfs::EntryHeader;

    #[test]
    fn initramfs_lookup() {
        let mut blob = EntryHeader::new("bin/init", 4).unwrap().to_bytes().to_vec();
        blob.extend_from_slice(b"\x7fELF");
        let fs = Initramfs::parse(&blob).unwrap();

        assert_eq!(FileLookup::lookup(&fs, "bin/init"), Some(&b"\x7fELF"[..]));
        assert_eq!(FileLookup::lookup(&fs, "bin/sh"), None);
    }
}
