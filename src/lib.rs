//! The storage and indexing substrate of an embeddable SQL engine:
//! a paged random-access file backend, a shadow (incremental backup)
//! log, a typed row codec, a data-file cache, a free-space manager, a
//! row store, an AVL index, and a defragmenter.
//!
//! SQL parsing/planning/execution, the transaction manager, catalog
//! objects, the client protocol, and the CLI are external collaborators;
//! this crate exposes the hook points they need (`store::RowStore`'s
//! `index_row`/`delete`/`commit_row`/`rollback_row`/`move_data`/`reindex`,
//! `store::RowStore::set_accessor`) without implementing the callers.

pub mod avl;
pub mod backend;
pub mod cache;
pub mod config;
pub mod defrag;
pub mod error;
pub mod header;
pub mod logging;
pub mod row;
pub mod shadow;
pub mod space;
pub mod store;
pub mod value;

pub use config::Config;
pub use error::StorageError;
