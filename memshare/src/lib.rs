//! An in-memory SMB2 share answering compound exchanges

#![deny(
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    variant_size_differences,

    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    // clippy::cargo
)]
#![allow(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    clippy::missing_docs_in_private_items,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

mod conn;
mod memshare;
mod node;

pub use self::conn::{frame_requests, split_frame, Message, Session};
pub use self::memshare::{MemShare, MemShareBuilder, Stats, ROOT_FID};
pub use self::node::NodeKind;
