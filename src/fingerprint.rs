//! Content hash of the measured executable, so a report can be tied to the
//! exact build that produced its exit codes.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

pub fn sha256_file(path: &Path) -> io::Result<[u8; 32]> {
    let bytes = fs::read(path)?;
    Ok(Sha256::digest(&bytes).into())
}

pub fn hex32(d: [u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in d {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

pub fn sha256_hex(path: &Path) -> io::Result<String> {
    sha256_file(path).map(hex32)
}
