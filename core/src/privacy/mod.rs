// Privacy: block-aligned padding for traffic analysis resistance
//
// Chat content uses constant-fill padding inside the payload codec. Raw
// blocks handed to the radio can additionally take random-fill padding.

pub mod padding;

pub use padding::{
    optimal_block_size, pad_random, pkcs7_pad, pkcs7_unpad, unpad_random, PaddingError,
    BLOCK_SIZES,
};
