pub mod cipher;
pub mod codec;
pub mod generator;

pub use codec::{Claims, CodecError, TokenCodec};
pub use generator::{generate_hex, generate_numeric, generate_salt};
