//! Error Types
//!
//! This module defines the error types used throughout the editor core.
//!
//! All public APIs that can fail return [`Result<T>`], an alias for
//! `std::result::Result<T, AtelierError>`. Lookups that cross an ownership
//! boundary (stale IDs, unknown instance slots) surface as typed errors
//! rather than panics, so callers can distinguish a programming-contract
//! violation from a recoverable condition.

use std::path::PathBuf;

use thiserror::Error;

use crate::registry::{ObjectType, ResourceId};
use crate::resources::mesh::InstanceId;

/// The main error type for the editor core.
#[derive(Error, Debug)]
pub enum AtelierError {
    // ========================================================================
    // Identity & Lookup Errors
    // ========================================================================
    /// An ID was dereferenced that was never issued or whose resource is gone.
    #[error("{object_type:?} {id} not found")]
    NotFound {
        /// The kind of object the caller expected.
        object_type: ObjectType,
        /// The stale or unknown identifier.
        id: ResourceId,
    },

    /// An ID was presented to the registry that it never issued.
    #[error("ID {0} was never issued by this registry")]
    UnknownId(ResourceId),

    /// A scene-node key referenced a node that was already destroyed.
    #[error("scene node is no longer alive")]
    DeadNode,

    /// An instance slot was addressed with an ID its mesh does not hold.
    #[error("mesh {mesh} has no instance {instance}")]
    UnknownInstance {
        /// The mesh whose instance map was consulted.
        mesh: ResourceId,
        /// The unknown per-mesh instance ID.
        instance: InstanceId,
    },

    // ========================================================================
    // Import Errors
    // ========================================================================
    /// The same source path was imported twice.
    #[error("model \"{0}\" is already loaded")]
    DuplicateImport(PathBuf),

    /// The external importer failed; the payload is never ingested.
    #[error("import failed: {0}")]
    ImportFailed(String),

    /// glTF parsing or loading error.
    #[error("glTF error: {0}")]
    GltfError(String),

    /// Image decoding error.
    #[error("image decode error: {0}")]
    ImageDecodeError(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ========================================================================
    // GPU Residency Errors
    // ========================================================================
    /// A bindless handle residency toggle was skipped or doubled.
    #[error("bindless residency violation: {0}")]
    ResidencyViolation(&'static str),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// A built-in default resource was targeted for deletion.
    #[error("cannot delete built-in default {0}")]
    DefaultResource(&'static str),
}

impl From<image::ImageError> for AtelierError {
    fn from(err: image::ImageError) -> Self {
        AtelierError::ImageDecodeError(err.to_string())
    }
}

impl From<gltf::Error> for AtelierError {
    fn from(err: gltf::Error) -> Self {
        AtelierError::GltfError(err.to_string())
    }
}

/// Alias for `Result<T, AtelierError>`.
pub type Result<T> = std::result::Result<T, AtelierError>;
