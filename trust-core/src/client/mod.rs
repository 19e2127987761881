pub mod signed;

pub use signed::SignedHttpClient;
