//! Message structs for the three servers, with hand-written bit-stream
//! codecs. Strings are bit-packed wide strings unless noted.

pub mod auth;
pub mod realm;
pub mod world;

pub use auth::*;
pub use realm::*;
pub use world::*;
