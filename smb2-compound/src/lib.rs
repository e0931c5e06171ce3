//! Path operations over SMB2, each carried out by a single compound exchange

#![deny(clippy::all)]
#![warn(
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications
)]

// wire modules
mod decode;
mod encode;
pub mod header;
pub mod info;
pub mod proto;

// engine modules
mod buffer_pool;
mod compound;
mod config;
mod error;
mod name;
mod ops;
mod response;
mod share;
mod status;
mod transport;

pub use self::buffer_pool::{Buffer, BufferPool};
pub use self::compound::{
    Command, Composer, CompoundRequest, FileId, HandleRef, SendFlags, SubRequest, MAX_COMPOUND,
};
pub use self::config::ShareConfig;
pub use self::decode::{Decode, DecodeError, Decoder};
pub use self::encode::{Encode, Encoder};
pub use self::error::{Error, Result};
pub use self::name::{encode_path, is_root, WireName};
pub use self::ops::{Middle, OpenParams, OperationKind, Payload};
pub use self::response::{validate_and_copy, ResponseBuffer, Responses};
pub use self::share::{PathInfo, Share};
pub use self::status::NtStatus;
pub use self::transport::Transport;
