//! Object URLs for attachment previews.
//!
//! Wraps file bytes in a `Blob` and hands out `blob:` URLs that `<img>`
//! and `<video>` elements can load. Every URL created here holds the
//! bytes alive in the browser until revoked.
//!
//! All functions in this module require a browser environment
//! (`wasm32-unknown-unknown` target).

use affix_core::{PreviewBackend, PreviewError};
use wasm_bindgen::JsValue;
use web_sys::BlobPropertyBag;

/// Errors that can occur while creating a Blob URL.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// A browser API call returned an error.
    #[error("browser API error: {0}")]
    JsError(String),
}

impl From<JsValue> for BlobError {
    fn from(value: JsValue) -> Self {
        Self::JsError(format!("{value:?}"))
    }
}

impl From<BlobError> for PreviewError {
    fn from(err: BlobError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Wrap `bytes` in a Blob of type `mime_type` and return its object URL.
///
/// The returned URL must be revoked via [`revoke_blob_url`] when no
/// longer needed.
///
/// # Errors
///
/// Returns [`BlobError::JsError`] if Blob or URL creation fails.
pub fn bytes_to_blob_url(bytes: &[u8], mime_type: &str) -> Result<String, BlobError> {
    let uint8_array = js_sys::Uint8Array::from(bytes);
    let parts = js_sys::Array::new();
    parts.push(&uint8_array);

    let opts = BlobPropertyBag::new();
    opts.set_type(mime_type);
    let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &opts)?;

    Ok(web_sys::Url::create_object_url_with_blob(&blob)?)
}

/// Revoke a Blob URL created by [`bytes_to_blob_url`].
pub fn revoke_blob_url(url: &str) {
    let _ = web_sys::Url::revoke_object_url(url);
}

/// Preview backend handing out browser object URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlobUrlPreviews;

impl PreviewBackend for BlobUrlPreviews {
    type Handle = String;

    fn acquire(&mut self, bytes: &[u8], mime_type: &str) -> Result<String, PreviewError> {
        Ok(bytes_to_blob_url(bytes, mime_type)?)
    }

    fn release(&mut self, url: String) {
        revoke_blob_url(&url);
    }
}
