//! # Backing File Header
//!
//! Every backing file wears a fixed header recording which logical path it
//! currently represents. A file is *associated* iff the path field is
//! non-empty AND the stored digest matches a recomputation; anything else is
//! blank capacity (or corruption, which is treated the same way: the slot
//! self-heals by being reclaimed).
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Description
//! 0       512   Logical path, UTF-8, NUL-padded
//! 512     4     Flags word (open-flag bits, little endian)
//! 516     8     Digest over bytes 0..516 (two LE u32 accumulators)
//! 524     ...   unused up to the payload
//! 4096          Payload (page-aligned)
//! ```
//!
//! The payload begins at a page-aligned offset so page 0 of the logical
//! file lands on an aligned boundary in the backing file.
//!
//! ## Digest
//!
//! An order-dependent rolling hash: two 32-bit accumulators seeded with
//! distinct constants, each folding every byte as `acc * 31 + byte * 307`
//! with wrapping arithmetic. It only exists when the digest-protection flag
//! is set; files without a valid, matching digest are never treated as
//! associated.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::store::AccessHandle;
use crate::vfs::OpenFlags;

/// Maximum logical path length, including no terminator (shorter paths are
/// NUL-padded to this size).
pub const HEADER_MAX_PATH: usize = 512;
/// Length of the digested region: path plus flags.
pub const HEADER_DIGEST_SPAN: usize = HEADER_MAX_PATH + 4;
/// Total serialized header size.
pub const HEADER_SIZE: usize = HEADER_DIGEST_SPAN + 8;
/// Byte offset where the payload region begins.
pub const HEADER_DATA_OFFSET: u64 = 4096;

const DIGEST_SEED_1: u32 = 0xdead_beef;
const DIGEST_SEED_2: u32 = 0x41c6_ce57;

/// Rolling digest over the header's path+flags region.
pub fn compute_digest(bytes: &[u8]) -> [u32; 2] {
    let mut h1 = DIGEST_SEED_1;
    let mut h2 = DIGEST_SEED_2;
    for &b in bytes {
        let v = (b as u32).wrapping_mul(307);
        h1 = h1.wrapping_mul(31).wrapping_add(v);
        h2 = h2.wrapping_mul(31).wrapping_add(v);
    }
    [h1, h2]
}

/// The on-disk header prefixed to every backing file's payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    path: [u8; HEADER_MAX_PATH],
    flags: U32,
    digest: [U32; 2],
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == HEADER_SIZE);

impl FileHeader {
    /// Builds an association header for `path`, computing and storing the
    /// digest. The digest-protection flag is forced on.
    pub fn associated(path: &str, flags: OpenFlags) -> Result<Self> {
        ensure!(
            !path.is_empty() && path.len() <= HEADER_MAX_PATH,
            "logical path length {} outside 1..={}",
            path.len(),
            HEADER_MAX_PATH
        );
        ensure!(
            !path.as_bytes().contains(&0),
            "logical path must not contain NUL bytes"
        );

        let mut header = Self {
            path: [0u8; HEADER_MAX_PATH],
            flags: U32::new((flags | OpenFlags::DIGEST).bits()),
            digest: [U32::ZERO; 2],
        };
        header.path[..path.len()].copy_from_slice(path.as_bytes());

        let digest = compute_digest(&header.as_bytes()[..HEADER_DIGEST_SPAN]);
        header.digest = [U32::new(digest[0]), U32::new(digest[1])];
        Ok(header)
    }

    /// An all-zero header: no path, no flags, no digest. Unassociated.
    pub fn cleared() -> Self {
        Self {
            path: [0u8; HEADER_MAX_PATH],
            flags: U32::ZERO,
            digest: [U32::ZERO; 2],
        }
    }

    /// The logical path, or `None` when the path field is empty or not
    /// valid UTF-8.
    pub fn path(&self) -> Option<&str> {
        if self.path[0] == 0 {
            return None;
        }
        let end = self
            .path
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(HEADER_MAX_PATH);
        std::str::from_utf8(&self.path[..end]).ok()
    }

    pub fn flags(&self) -> OpenFlags {
        OpenFlags::from_bits(self.flags.get())
    }

    /// True when the digest-protection flag is set and the stored digest
    /// matches a recomputation over path+flags.
    pub fn digest_matches(&self) -> bool {
        if !self.flags().has_digest() {
            return false;
        }
        let expected = compute_digest(&self.as_bytes()[..HEADER_DIGEST_SPAN]);
        self.digest[0].get() == expected[0] && self.digest[1].get() == expected[1]
    }

    /// Loads the header from the start of a backing file. A file shorter
    /// than the header parses as cleared.
    pub fn load<H: AccessHandle>(handle: &mut H) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        let n = handle.read_at(&mut buf, 0)?;
        if n < HEADER_SIZE {
            return Ok(Self::cleared());
        }
        Self::read_from_bytes(&buf)
            .map_err(|e| eyre::eyre!("failed to parse backing file header: {:?}", e))
    }

    /// Writes the header to the start of a backing file and flushes it.
    pub fn store<H: AccessHandle>(&self, handle: &mut H) -> Result<()> {
        let written = handle.write_at(self.as_bytes(), 0)?;
        if written != HEADER_SIZE {
            return Err(crate::vfs::VfsError::ShortWrite {
                requested: HEADER_SIZE,
                written,
            }
            .into());
        }
        handle.flush()?;
        Ok(())
    }
}

/// Reads the association from a backing file. Returns the logical path and
/// flags when the header is intact; otherwise clears the header (self-heal)
/// and returns `None`.
pub fn read_associated_path<H: AccessHandle>(handle: &mut H) -> Result<Option<(String, OpenFlags)>> {
    let header = FileHeader::load(handle)?;

    let path = match header.path() {
        Some(p) if header.digest_matches() => p.to_string(),
        Some(_) | None => {
            // A non-empty path with a bad digest is corruption: reclaim.
            if header.path[0] != 0 {
                clear_association(handle)?;
            }
            return Ok(None);
        }
    };
    Ok(Some((path, header.flags())))
}

/// Associates a backing file with `path`, writing header and digest.
pub fn set_associated_path<H: AccessHandle>(
    handle: &mut H,
    path: &str,
    flags: OpenFlags,
) -> Result<()> {
    FileHeader::associated(path, flags)?.store(handle)
}

/// Disassociates a backing file: zeroes the header and drops the payload.
pub fn clear_association<H: AccessHandle>(handle: &mut H) -> Result<()> {
    FileHeader::cleared().store(handle)?;
    handle.truncate(HEADER_DATA_OFFSET)?;
    handle.flush()?;
    Ok(())
}
