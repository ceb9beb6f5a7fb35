//! Stemmer - Debian rootfs builder
//!
//! Builds a project's root filesystem by cloning its platform's rootfs,
//! installing packages inside a chroot (with qemu user-mode emulation for
//! foreign architectures) and publishing the result. Packages installed
//! for a recipe are cached per architecture and reused by later builds.

pub mod arch;
pub mod build;
pub mod chroot;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod process;
pub mod recipe;
pub mod rootfs;
pub mod ui;

pub use error::{StemmerError, StemmerResult};
