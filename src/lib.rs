// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A reader/writer for Multiscale Electrophysiology Data (MED): a
//! hierarchical, versioned, optionally-encrypted time-series and video
//! recording format used in long-duration physiological recording.
//!
//! ##### About
//!
//! A MED *session* on disk is a directory tree: session → channels
//! (time-series or video) → numbered segments → fixed files per segment
//! (metadata, indices, compressed data, optional records). This crate
//! discovers that tree, opens it under a password, resolves time/sample
//! slices across segments and channels, decompresses time-series data
//! on demand, verifies integrity via CRC, and exposes the aggregated
//! view.
//!
//! Four subsystems make up the core of this crate:
//!
//! - [`fps`]: the on-disk file model ([`universal_header`]) and the
//!   unified [`fps::Fps`] I/O primitive every MED file is read through.
//! - [`tree`]: the hierarchical open/read pipeline —
//!   [`tree::open_session`] builds a [`tree::Session`] of
//!   [`tree::Channel`]s of [`tree::Segment`]s, resolving a requested
//!   [`time_slice::TimeSlice`] into the segments that overlap it.
//! - [`password`] and [`aes`]/[`sha256`]: AES-128 password/encryption
//!   machinery with three access levels, and the CRC-32 machinery in
//!   [`crc32`] that protects headers and bodies independently of
//!   encryption.
//! - [`cmp`]: the compressed time-series block codec (RED, PRED, MBE,
//!   VDS), driven end-to-end by [`read::read_channel_samples`].
//!
//! # Example usage
//!
//! ```no_run
//! use med::{open_session, ChannelSelector, OpenOptions, TimeSlice};
//! use std::path::Path;
//!
//! let session = open_session(
//!     Path::new("/recordings/my_session.medd"),
//!     &ChannelSelector::All,
//!     TimeSlice::full(),
//!     &OpenOptions::new(),
//! )?;
//!
//! for channel in session.channels() {
//!     println!("{}: {} segments mapped", channel.name, channel.segments().count());
//! }
//! # Ok::<(), med::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod aes;
pub mod cmp;
mod coding;
pub mod contiguon;
pub mod crc32;
mod error;
pub mod file_type;
pub mod fps;
pub mod fs;
pub mod index_entry;
pub mod index_lookup;
pub mod metadata;
pub mod options;
pub mod password;
pub mod read;
pub mod records;
pub mod segment_resolution;
pub mod sentinels;
pub mod sha256;
pub mod time_slice;
pub mod tree;
pub mod universal_header;

pub use coding::{Decode, DecodeError, Encode, EncodeError};
pub use error::{Error, Result};
pub use options::{CrcMode, FailBehavior, LevelHeaderFlags, OpenOptions};
pub use read::{read_channel_samples, SampleRun};
pub use time_slice::{SliceAnchor, TimeSlice};
pub use tree::{open_session, Channel, ChannelHandle, ChannelSelector, Segment, SegmentHandle, Session};
