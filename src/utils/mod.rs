//! Utility modules supporting the collection pipeline.
//!
//! - [`DedupSet`]: identifiers already collected in the current run
//! - [`HttpClient`]: shared reqwest client with timeouts and user agent
//! - [`RequestSigner`]: RSA signatures for outbound request bodies
//! - [`generate_key_pair`]: new RSA key pair for request signing

mod dedup;
mod http;
mod signing;

pub use dedup::DedupSet;
pub use http::{HttpClient, DEFAULT_TIMEOUT};
pub use signing::{
    generate_key_pair, KeyError, KeyPairPem, RequestSigner, DEFAULT_KEY_BITS,
    MIN_KEY_BITS,
};
