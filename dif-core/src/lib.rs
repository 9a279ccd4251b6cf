pub mod bencode;
pub mod build;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod path_safety;
pub mod piece;
pub mod plan;
pub mod progress;
pub mod tree;
pub mod verify;

pub use build::{create_fingerprint, BuildOptions, BuiltDescriptor, DescriptorBuilder, DEFAULT_PIECE_LENGTH};
pub use descriptor::{ContentDescriptor, Envelope, FileEntry, Layout};
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use verify::{verify, verify_data, VerifyOptions, VerifyReport, Verifier};
