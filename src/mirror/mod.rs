// FILE: src/mirror/mod.rs
pub mod client;
pub mod worker;

pub use client::MirrorClient;
pub use worker::{spawn_mirror_worker, MirrorHandle, MirrorJob, MirrorTicket};
