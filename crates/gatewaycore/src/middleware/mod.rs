//! Cross-cutting request/response middleware, applied in the dispatcher's
//! composition order: [`recovery`] first, then [`request_id`], then
//! [`compression`], then [`host_scripts`] last before admin routes and the
//! catch-all dispatcher.

pub mod compression;
pub mod host_scripts;
pub mod recovery;
pub mod request_id;
