//! Packs files into an initramfs archive.
//!
//! ```text
//! mkinitramfs <out> <name=path | path>...
//! ```
//!
//! Without `name=`, the file is stored under its path as given.

use initramfs::{EntryHeader, InitramfsError, MAX_ENTRIES, padded_len};
use std::io::{self, Error};
use std::path::PathBuf;
use std::{env, fs};

struct Input {
    name: String,
    path: PathBuf,
}

fn parse_input(arg: &str) -> Input {
    match arg.split_once('=') {
        Some((name, path)) => Input {
            name: name.to_owned(),
            path: PathBuf::from(path),
        },
        None => Input {
            name: arg.to_owned(),
            path: PathBuf::from(arg),
        },
    }
}

/// Encode `(name, bytes)` pairs, followed by a terminator header.
fn pack<'a>(files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Result<Vec<u8>, InitramfsError> {
    let mut out = Vec::new();
    let mut count = 0usize;
    for (name, data) in files {
        count += 1;
        if count > MAX_ENTRIES {
            return Err(InitramfsError::TooManyEntries);
        }
        let header = EntryHeader::new(name, data.len())?;
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(data);
        out.resize(out.len() - data.len() + padded_len(header.size()), 0);
    }
    out.extend_from_slice(&EntryHeader::terminator().to_bytes());
    Ok(out)
}

fn main() -> io::Result<()> {
    let mut args = env::args().skip(1);
    let out = args
        .next()
        .ok_or_else(|| Error::other("usage: mkinitramfs <out> <name=path | path>..."))?;

    let inputs: Vec<Input> = args.map(|a| parse_input(&a)).collect();
    let mut blobs = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let bytes = fs::read(&input.path)
            .map_err(|e| Error::other(format!("{}: {e}", input.path.display())))?;
        blobs.push(bytes);
    }

    let archive = pack(
        inputs
            .iter()
            .zip(&blobs)
            .map(|(i, b)| (i.name.as_str(), b.as_slice())),
    )
    .map_err(Error::other)?;

    let out = PathBuf::from(out);
    if let Some(dir) = out.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&out, &archive)?;
    eprintln!("packed {} files into {}", inputs.len(), out.display());
    Ok(())
}
