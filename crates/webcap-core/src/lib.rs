//! Capture engine for an embedding browser: mirrors whitelisted HTTP
//! resources observed by the host's network layer into an on-disk tree.

pub mod capture;
pub mod clock;
pub mod config;
pub mod engine;
pub mod logging;
pub mod mirror_index;
pub mod network;
pub mod overwrite;
pub mod settings;
pub mod storage;
pub mod url_model;
pub mod whitelist;

pub use capture::{CaptureSession, CaptureStats, CaptureStatus};
pub use engine::CaptureEngine;
pub use overwrite::OverwriteMode;
