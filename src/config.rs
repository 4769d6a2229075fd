//! Explicit configuration, constructed by the caller and passed in —
//! no property-file parsing (that belongs to whatever owns the
//! properties file; this crate only consumes the parsed result). Field
//! names and defaults mirror HSQLDB's own properties table.

#[derive(Debug, Clone)]
pub struct Config {
    /// `hsqldb.nio_max_size`: below this file size the mapped backend is
    /// used; at or above it, callers fall back to the buffered backend.
    pub nio_max_size: u64,
    /// `hsqldb.cache_rows`: maximum number of cached rows before eviction.
    pub cache_rows: usize,
    /// `hsqldb.cache_size`: maximum cached bytes before eviction.
    pub cache_size_bytes: u64,
    /// `hsqldb.defrag_limit`: percentage of lost space that triggers
    /// defragmentation.
    pub defrag_limit_percent: u8,
    /// `hsqldb.max_free_blocks`: per-table-space free-list cap.
    pub max_free_blocks: usize,
    /// `hsqldb.write_delay`: group-commit delay in milliseconds; 0 disables.
    pub write_delay_ms: u32,
    /// `sql.enforce_names`: strict reserved-keyword mode. Carried here for
    /// completeness of the properties table; it has no effect below the
    /// SQL-facing boundary this crate does not implement.
    pub enforce_names: bool,
    /// Data file page size in bytes, fixed at a power of two, default 8 KiB.
    pub page_size: u32,
    /// Data-file scale `S`, one of {1,2,4,8,16,32,64}.
    pub scale: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            nio_max_size: 256 * 1024 * 1024,
            cache_rows: 50_000,
            cache_size_bytes: 64 * 1024 * 1024,
            defrag_limit_percent: 20,
            max_free_blocks: 256,
            write_delay_ms: 0,
            enforce_names: false,
            page_size: 1 << 13,
            scale: 1,
        }
    }
}
