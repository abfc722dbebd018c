// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the errors raised while building or fetching resources.

use std::path::Path;
use thiserror::Error;

/// An error raised while resolving, decoding or uploading a resource.
///
/// The synchronous load path recovers from all of these locally (stub or
/// absent handle). They only surface to callers through the futures returned
/// by background loads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The path was empty, escaped the assets directory or could not be normalized.
    #[error("invalid or unsafe resource path '{0}'")]
    InvalidPath(String),

    /// The CPU-side decode phase failed.
    #[error("failed to decode '{path}': {reason}")]
    Decode {
        /// The path being decoded.
        path: String,
        /// A description of the failure.
        reason: String,
    },

    /// The GPU-side upload phase failed.
    #[error("failed to upload '{path}': {reason}")]
    Upload {
        /// The path being uploaded.
        path: String,
        /// A description of the failure.
        reason: String,
    },

    /// The id is already cached with a different resource type.
    #[error("resource '{path}' is cached as `{cached}`, not `{requested}`")]
    TypeMismatch {
        /// The requested path.
        path: String,
        /// Type name of the cached entry.
        cached: &'static str,
        /// Type name requested by the caller.
        requested: &'static str,
    },

    /// A decode or upload closure panicked.
    #[error("loading '{path}' panicked: {message}")]
    Panicked {
        /// The path being loaded.
        path: String,
        /// The panic payload, when it was a string.
        message: String,
    },

    /// The request was dropped before it completed, usually because the cache shut down.
    #[error("load of '{0}' was cancelled before completion")]
    Cancelled(String),

    /// Reading the source file failed.
    #[error("I/O error on '{path}': {reason}")]
    Io {
        /// The path being read.
        path: String,
        /// The underlying I/O error message.
        reason: String,
    },
}

impl ResourceError {
    /// Builds a [`ResourceError::Decode`].
    pub fn decode(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Builds a [`ResourceError::Upload`].
    pub fn upload(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::Upload {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wraps an I/O error raised while reading `path`.
    pub fn io(path: impl AsRef<Path>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            reason: error.to_string(),
        }
    }

    /// Returns `true` for failures caused by the path itself rather than its content.
    pub fn is_path_error(&self) -> bool {
        matches!(self, Self::InvalidPath(_) | Self::TypeMismatch { .. })
    }
}
