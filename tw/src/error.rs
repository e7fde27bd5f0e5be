//! Errors produced by [`TimerWheel`](crate::TimerWheel) operations.

use quick_error::quick_error;

quick_error! {
    /// A timer wheel error.
    #[derive(Debug)]
    pub enum Error {
        /// Growing a slot's node list failed to allocate.
        AllocationFailure {
            description("allocation failure while growing a wheel slot")
        }
    }
}
