//! Media pipeline module
//!
//! Fetching of third-party images on behalf of the browser:
//!
//! - **UpstreamFetcher / HttpFetcher**: single GET with redirects disabled
//! - **read_bounded**: streaming reader with a hard byte ceiling
//! - **fetch_image**: status, content-type allowlist, declared and measured
//!   size checks, in that order
//!
//! URLs must already have passed [`crate::security::SsrfProtection`].

pub mod fetch;

pub use fetch::{
    allowed_image_type, fetch_image, read_bounded, ByteStream, FetchError, FetchedImage,
    HttpFetcher, UpstreamFetcher, UpstreamResponse, ALLOWED_IMAGE_TYPES, PROXY_MAX_BYTES,
    THUMBNAIL_MAX_BYTES,
};
