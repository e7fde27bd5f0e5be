//! Errors produced by [`ShardedHashTable`](crate::ShardedHashTable) operations.

use quick_error::quick_error;

quick_error! {
    /// A sharded hash table error.
    #[derive(Debug)]
    pub enum Error {
        /// The supplied key was empty.
        ///
        /// Keys are copied byte sequences; an empty key carries no hashable content, so it is
        /// rejected rather than silently aliasing every other empty-keyed entry.
        InvalidKey {
            description("key must not be empty")
        }
        /// The requested key is not present in either the current or the old table.
        NotFound {
            description("key not found")
        }
        /// Growing a bucket array (during resize) failed to allocate.
        AllocationFailure {
            description("allocation failure while growing the table")
        }
    }
}
