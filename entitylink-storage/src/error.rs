//! Conversions from this crate's I/O-shaped failures into the engine's
//! closed error set (spec §7). `entitylink-storage` has no error type of
//! its own — every store trait method already returns `entitylink::Result`,
//! so backends map their failures onto `Error::Backend`/`Error::NotFound`
//! at the point they occur instead of carrying a parallel error hierarchy.

use entitylink::Error;

/// Wrap an I/O failure as a backend error, keeping the path in the message
/// for diagnostics.
pub(crate) fn io_err(context: &str, err: std::io::Error) -> Error {
    Error::backend(format!("{context}: {err}"))
}
