pub mod decoder;
pub mod digest;
pub mod encoder;
pub mod error;
pub mod format;
pub mod media;
pub mod progress;
pub mod verify;

pub use decoder::decode;
pub use digest::{Fingerprint, SectorDigest};
pub use encoder::{EncodeSummary, Encoder, EncoderOptions};
pub use error::{Result, WuxError};
pub use format::{Header, IndexTable, HEADER_SIZE, MAGIC_A, MAGIC_B};
pub use media::{ContainerLayout, Media};
pub use progress::{NoProgress, Progress};
pub use verify::{compare, validate, Verdict};
