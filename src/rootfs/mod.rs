//! Root filesystem trees on disk
//!
//! [`RootfsImage`] owns one rootfs directory. It can be cloned to a new
//! location, moved, removed, and prepared for running foreign-architecture
//! binaries under chroot.

mod environment;
mod image;

pub use environment::SERVICE_STUBS;
pub use image::RootfsImage;

/// Build-time scratch area inside the rootfs, removed before publish
pub const STAGING_ROOT: &str = "var/cache/stemmer";

/// Package staging directory, relative to the rootfs root
pub const PACKAGE_STAGING_DIR: &str = "var/cache/stemmer/packages";
