pub mod signature;

pub use signature::{RequestSigner, RequestVerifier, SignatureError, SignedHeaders};
