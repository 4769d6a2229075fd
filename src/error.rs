//! Crate-wide error aggregation.
//!
//! Each component defines its own `thiserror` enum with exactly the
//! variants that component can raise (mirroring the teacher's per-module
//! `Error` enums in `dbheader.rs`, `serial_type.rs`, `vfs.rs`, `pager.rs`).
//! `StorageError` exists only at the seams where one component's caller
//! needs to propagate another component's error without flattening the
//! distinction — it is not meant to replace the per-component enums.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Backend(#[from] crate::backend::Error),
    #[error(transparent)]
    Shadow(#[from] crate::shadow::Error),
    #[error(transparent)]
    Row(#[from] crate::row::Error),
    #[error(transparent)]
    Cache(#[from] crate::cache::Error),
    #[error(transparent)]
    Space(#[from] crate::space::Error),
    #[error(transparent)]
    Store(#[from] crate::store::Error),
    #[error(transparent)]
    Avl(#[from] crate::avl::Error),
    #[error(transparent)]
    Defrag(#[from] crate::defrag::Error),
}
