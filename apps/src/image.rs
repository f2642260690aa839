//! On-storage app image verification (the STORAGE/REMOTE loading path of
//! C10). Only the minimal required contract is implemented
//! here: parse the header, verify the magic and CRC, and hand the
//! verified body to an external `ImageLoader` that knows how to turn
//! bytes into entry/exit pointers. The binary format itself -- ELF
//! sections, relocations -- is out of scope; image packaging is treated
//! as a host-side build step rather than core runtime logic.

use crc::{Crc, CRC_32_ISCSI};

use abi::{AppImageHeader, CoreError, CoreResult};

use crate::manifest::AppManifest;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Parses and verifies the header at the front of `image`, returning the
/// header and the body bytes (everything after it, truncated to `size`).
pub fn verify_image(image: &[u8]) -> CoreResult<(AppImageHeader, &[u8])> {
    let header = AppImageHeader::parse(image).ok_or(CoreError::AppInvalidManifest)?;
    if !header.is_magic_valid() {
        return Err(CoreError::AppInvalidManifest);
    }
    let body_start = AppImageHeader::SIZE;
    let body_end = body_start
        .checked_add(header.size as usize)
        .ok_or(CoreError::AppInvalidManifest)?;
    let body = image.get(body_start..body_end).ok_or(CoreError::AppInvalidManifest)?;

    let mut digest = CRC32.digest();
    digest.update(body);
    if digest.finalize() != header.crc32 {
        return Err(CoreError::AppInvalidManifest);
    }

    Ok((header, body))
}

/// External collaborator that turns a verified image body into entry/exit
/// pointers and a manifest. Registered per `AppSource` with the manager;
/// the manager itself never interprets the bytes.
pub trait ImageLoader: Send + Sync {
    fn load(&self, header: &AppImageHeader, body: &[u8]) -> CoreResult<AppManifest>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image(body: &[u8]) -> Vec<u8> {
        let mut digest = CRC32.digest();
        digest.update(body);
        let crc32 = digest.finalize();

        let mut bytes = Vec::with_capacity(AppImageHeader::SIZE + body.len());
        bytes.extend_from_slice(&abi::APP_IMAGE_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 32]); // name
        bytes.extend_from_slice(&[0u8; 16]); // version
        bytes.extend_from_slice(&[0u8; 32]); // author
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes()); // entry_offset
        bytes.extend_from_slice(&crc32.to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn verifies_matching_crc() {
        let image = sample_image(b"hello app");
        let (header, body) = verify_image(&image).unwrap();
        assert!(header.is_magic_valid());
        assert_eq!(body, b"hello app");
    }

    #[test]
    fn rejects_corrupted_body() {
        let mut image = sample_image(b"hello app");
        let last = image.len() - 1;
        image[last] ^= 0xFF;
        assert_eq!(verify_image(&image).unwrap_err(), CoreError::AppInvalidManifest);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut image = sample_image(b"x");
        image[0] ^= 0xFF;
        assert_eq!(verify_image(&image).unwrap_err(), CoreError::AppInvalidManifest);
    }
}
