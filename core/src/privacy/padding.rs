// Message padding: traffic analysis resistance via block-aligned sizes
//
// Two independent schemes live here and are used at different layers:
//
// - Constant fill (PKCS#7 style): every pad byte holds the pad length.
//   Used by the chat payload codec on message content.
// - Random fill: filler bytes are random, only the final byte holds the
//   filler length. Used on raw blocks before they hit the air.
//
// The two formats are not interchangeable.

use rand::RngCore;
use thiserror::Error;

/// Candidate block sizes for random-fill padding
pub const BLOCK_SIZES: &[usize] = &[256, 512, 1024, 2048];

/// Largest filler a single trailing length byte can describe
pub const MAX_RANDOM_PADDING: usize = 255;

/// Largest block the constant-fill scheme supports (a 256 pad is written as 0x00)
pub const MAX_PKCS7_BLOCK: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaddingError {
    #[error("Invalid padding configuration: {0}")]
    InvalidConfig(String),
}

/// Constant-fill padding to the next multiple of `block_size`.
///
/// Always appends between 1 and `block_size` bytes, each equal to the pad
/// length. Block-aligned input therefore gains a whole extra block; with a
/// 256-byte block that pad length is stored as `0x00`.
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Result<Vec<u8>, PaddingError> {
    if block_size == 0 || block_size > MAX_PKCS7_BLOCK {
        return Err(PaddingError::InvalidConfig(format!(
            "block size must be in 1..={}, got {}",
            MAX_PKCS7_BLOCK, block_size
        )));
    }

    let pad_len = block_size - (data.len() % block_size);
    let fill = (pad_len % 256) as u8;

    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, fill);
    Ok(padded)
}

/// Reverse `pkcs7_pad` by trusting the trailing length byte.
///
/// Input whose declared pad length exceeds its size is returned unchanged.
pub fn pkcs7_unpad(padded: &[u8]) -> Vec<u8> {
    let Some(&last) = padded.last() else {
        return Vec::new();
    };
    let pad_len = if last == 0 { 256 } else { last as usize };
    if pad_len > padded.len() {
        return padded.to_vec();
    }
    padded[..padded.len() - pad_len].to_vec()
}

/// Random-fill padding toward a multiple of `target_size`.
///
/// Appends `target_size - (len % target_size)` bytes, capped at 255. The
/// filler is random except for its final byte, which records the filler
/// length. Two calls on the same input almost never produce the same bytes.
///
/// A zero target means no padding: the data comes back unchanged. That is
/// what `optimal_block_size` yields for an empty buffer.
pub fn pad_random(data: &[u8], target_size: usize) -> Result<Vec<u8>, PaddingError> {
    if target_size == 0 {
        return Ok(data.to_vec());
    }

    let pad_len = (target_size - (data.len() % target_size)).min(MAX_RANDOM_PADDING);

    let mut filler = vec![0u8; pad_len];
    rand::thread_rng().fill_bytes(&mut filler);
    filler[pad_len - 1] = pad_len as u8;

    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.extend_from_slice(&filler);
    Ok(padded)
}

/// Reverse `pad_random`.
///
/// Returns the input unchanged if the trailing length byte is zero or larger
/// than the buffer.
pub fn unpad_random(padded: &[u8]) -> Vec<u8> {
    let Some(&last) = padded.last() else {
        return Vec::new();
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > padded.len() {
        return padded.to_vec();
    }
    padded[..padded.len() - pad_len].to_vec()
}

/// Smallest block size whose random-fill overhead for `data_len` bytes is
/// at most 255. Falls back to `data_len` itself when none qualifies.
pub fn optimal_block_size(data_len: usize) -> usize {
    BLOCK_SIZES
        .iter()
        .copied()
        .find(|&size| size - (data_len % size) <= MAX_RANDOM_PADDING)
        .unwrap_or(data_len)
}
