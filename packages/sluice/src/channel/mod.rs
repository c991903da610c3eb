// implementation of the sluice channel.
//
// the basic architecture is as such:
//
// channel handles wrap around Arc<Mutex<shared state>>
//                                         |
//          /------------------------------/
//          v
//       shared state
//          |
//          |------ it contains the lifecycle state (open / draining / closed) and the value
//          |       queue: a VecDeque of entries, each either a fulfilled buffered value or a
//          |       pending send still carrying its blocked sender's resolution slot
//          |
//          |------ it contains a "taker queue": waiting consumers as (token, waker) pairs.
//          |       claims are gated on being at the front of this queue, which is what makes
//          |       consumers get served strictly FIFO, and removing the front forwards the wake
//          |       so a cancelled consumer never strands a value
//          |
//          \------ it contains a "sender queue" (waiting send arms), an "observer queue"
//                  (non-consuming wait() probes), and the close-waiter queue
//
// values only ever move when a future or a select claims them under the lock, so cancelling any
// registration (dropping its future or guard) has no observable side effect.
//
// the organization of these modules is as such:
//
//      waiter_queue<-----------core: presents a fully safe, panicky-and-inconvenient abstraction
//                              ^     for channels, where all state transitions live.
//                              |
//                              api: wraps core into the convenient, defensive API the crate
//                                   re-exports publically, including the futures and the
//                                   single-use operation handles.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;

mod waiter_queue;
pub(crate) mod core;
