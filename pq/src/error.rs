//! Errors produced by [`ExpiringQueue`](crate::ExpiringQueue) operations.

use quick_error::quick_error;

quick_error! {
    /// An expiring priority queue error.
    #[derive(Debug)]
    pub enum Error {
        /// Growing the heap array failed to allocate.
        AllocationFailure {
            description("allocation failure while growing the queue")
        }
    }
}
