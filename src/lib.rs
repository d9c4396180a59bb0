#![doc = "immich-watch: watch folders for new photos and videos, upload them to Immich, archive the originals."]

//! The pipeline is event source → stability check → validation → serial upload queue → archive.
//!
//! - [`watcher`] and [`scanner`] discover files; [`events`] debounces them and waits for
//!   [`stability`] before handing ready [`file_record::FileRecord`]s on.
//! - [`processor`] queues ready records and drives an [`uploader::Uploader`]; the shipped
//!   implementation is [`upload::ImmichClient`].
//! - [`load_config`] builds the [`config::Config`] every component shares.

pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod file_record;
pub mod integrity;
pub mod load_config;
pub mod notifications;
pub mod processor;
pub mod scanner;
pub mod stability;
pub mod stats;
pub mod upload;
pub mod uploader;
pub mod watcher;

pub use config::Config;
pub use file_record::{FileRecord, Rejection};
pub use processor::FileProcessor;
pub use upload::ImmichClient;
pub use uploader::{UploadResult, Uploader};
pub use watcher::FileWatcher;
