//! sealdrop-storage: object storage and metadata adapters
//!
//! The pipelines talk to storage only through two traits:
//! - [`MultipartBackend`]: initiate / upload part / complete / abort, single-shot
//!   small puts, and ranged reads of stored objects
//! - [`ManifestStore`]: save / get / record-download of file manifests
//!
//! Backends: presigned URLs issued by the share server (reqwest), or an
//! OpenDAL operator talking to S3, a local directory, or memory directly.

pub mod backend;
pub mod health;
mod http;
pub mod manifest_store;
pub mod multipart;
pub mod operator;
pub mod presigned;
#[cfg(test)]
mod test_support;

pub use backend::{object_key_for, MultipartBackend};
pub use health::{check_api_health, check_health};
pub use manifest_store::{fetch_manifest, HttpManifestStore, ManifestStore, OperatorManifestStore};
pub use multipart::{etag_of, OperatorBackend, SweepReport};
pub use operator::{
    build_from_config, build_fs_operator, build_memory_operator, build_operator, S3Credentials,
};
pub use presigned::PresignedBackend;
