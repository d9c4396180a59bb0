//! # uploader: interface between the processing queue and the remote media server
//!
//! This module defines the [`Uploader`] trait the worker drives for every dequeued file, and the
//! [`UploadResult`] it gets back. The concrete HTTP implementation lives in [`crate::upload`].
//!
//! ## Contract
//! - `upload` never returns an error: every outcome, including network failures and invalid
//!   files, is an [`UploadResult`] with a human-readable message.
//! - `test_connection` is a cheap reachability probe used once at startup.
//! - `close` releases the client; uploads after it fail fast.
//!
//! ## Mocking & Testing
//! The trait is annotated for `mockall` so tests can script upload outcomes without a server.

use async_trait::async_trait;
use std::fmt;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::file_record::FileRecord;

/// Outcome of one upload attempt. Produced once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub success: bool,
    pub message: String,
    pub asset_id: Option<String>,
}

impl UploadResult {
    pub fn succeeded(message: impl Into<String>, asset_id: Option<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            asset_id,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            asset_id: None,
        }
    }
}

impl fmt::Display for UploadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UploadResult(success={}, message='{}', asset_id={:?})",
            self.success, self.message, self.asset_id
        )
    }
}

/// Uploads files to a remote media server.
///
/// The trait is `Send` + `Sync` and shared behind an `Arc` between the processor and its worker.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Validates and uploads one file.
    async fn upload(&self, record: &FileRecord) -> UploadResult;

    /// Whether the server answers its health endpoint.
    async fn test_connection(&self) -> bool;

    async fn close(&self);
}
