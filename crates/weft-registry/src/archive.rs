//! Member access for Go package archives (`ar` format)
//!
//! Go archives are plain `ar` files: an 8-byte magic, then members, each a
//! 60-byte header followed by the data padded to an even length. Only what
//! the link-deps manifest needs is supported: listing, reading and adding
//! short-named members.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;

use crate::error::{RegistryError, Result};
use crate::write_atomic;

const MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER_LEN: usize = 60;
const NAME_LEN: usize = 16;

/// One member: its name and the byte range of its data in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub data: Range<u64>,
}

fn malformed(path: &Path, message: impl Into<String>) -> RegistryError {
    RegistryError::MalformedArchive {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// List the members of the archive at `path`.
pub fn members(path: &Path) -> Result<Vec<Member>> {
    let mut file = File::open(path).map_err(|e| RegistryError::io(path, e))?;
    let len = file.metadata().map_err(|e| RegistryError::io(path, e))?.len();

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)
        .map_err(|_| malformed(path, "too short for an archive"))?;
    if &magic != MAGIC {
        return Err(malformed(path, "missing archive magic"));
    }

    let mut members = Vec::new();
    let mut offset = MAGIC.len() as u64;
    while offset < len {
        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header)
            .map_err(|_| malformed(path, format!("truncated header at byte {}", offset)))?;
        if &header[58..60] != b"`\n" {
            return Err(malformed(path, format!("bad header terminator at byte {}", offset)));
        }

        let name = String::from_utf8_lossy(&header[..NAME_LEN])
            .trim_end()
            .trim_end_matches('/')
            .to_string();
        let size: u64 = std::str::from_utf8(&header[48..58])
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| malformed(path, format!("bad member size at byte {}", offset)))?;

        let start = offset + HEADER_LEN as u64;
        let end = start + size;
        if end > len {
            return Err(malformed(path, format!("member {:?} runs past end of file", name)));
        }
        members.push(Member {
            name,
            data: start..end,
        });

        offset = end + (size % 2);
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| RegistryError::io(path, e))?;
    }
    Ok(members)
}

/// Data of the member called `name`, if present.
pub fn read_member(path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let Some(member) = members(path)?.into_iter().find(|m| m.name == name) else {
        return Ok(None);
    };
    let mut file = File::open(path).map_err(|e| RegistryError::io(path, e))?;
    file.seek(SeekFrom::Start(member.data.start))
        .map_err(|e| RegistryError::io(path, e))?;
    let mut data = vec![0u8; (member.data.end - member.data.start) as usize];
    file.read_exact(&mut data)
        .map_err(|e| RegistryError::io(path, e))?;
    Ok(Some(data))
}

/// Add a member called `name`, replacing an existing one of that name.
pub fn write_member(path: &Path, name: &str, data: &[u8]) -> Result<()> {
    if name.len() > NAME_LEN || name.contains(char::is_whitespace) {
        return Err(malformed(path, format!("invalid member name {:?}", name)));
    }

    let existing = members(path)?;
    if !existing.iter().any(|m| m.name == name) {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| RegistryError::io(path, e))?;
        return file
            .write_all(&encode_member(name, data))
            .map_err(|e| RegistryError::io(path, e));
    }

    // rebuild without the old member, then swap the file in
    let original = std::fs::read(path).map_err(|e| RegistryError::io(path, e))?;
    let mut rebuilt = MAGIC.to_vec();
    for member in existing.iter().filter(|m| m.name != name) {
        let header_start = (member.data.start as usize) - HEADER_LEN;
        let padded_end = (member.data.end + (member.data.end - member.data.start) % 2) as usize;
        rebuilt.extend_from_slice(&original[header_start..padded_end]);
    }
    rebuilt.extend_from_slice(&encode_member(name, data));

    write_atomic(path, &rebuilt)
}

fn encode_member(name: &str, data: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
        name,
        0,
        0,
        0,
        644,
        data.len()
    )
    .into_bytes();
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(b'\n');
    }
    out
}

/// Create an empty archive (tests and tooling).
pub fn create(path: &Path) -> Result<()> {
    std::fs::write(path, MAGIC).map_err(|e| RegistryError::io(path, e))
}
