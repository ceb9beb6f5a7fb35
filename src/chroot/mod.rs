//! Command execution inside a rootfs
//!
//! - `ChrootRunner`: how a single command reaches the rootfs (host `chroot`)
//! - `ChrootExecuter`: an ordered command list run against one rootfs

mod executer;
mod runner;

pub use executer::ChrootExecuter;
pub use runner::{ChrootOutput, ChrootRunner, HostChroot};
