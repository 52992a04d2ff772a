//! Frame transport over a single persistent TCP connection.
//!
//! | Module     | Purpose                                                |
//! |------------|--------------------------------------------------------|
//! | `codec`    | `WireFrame` and the length-prefixed `FrameCodec`       |
//! | `channel`  | `TransportChannel` state machine and `FrameSink` seam  |
//! | `receiver` | `FrameReceiver` for the consuming side                 |

pub mod channel;
pub mod codec;
pub mod receiver;

pub use channel::{DEFAULT_CONNECT_TIMEOUT, Endpoint, FrameSink, TransportChannel, TransportPhase};
pub use codec::{FrameCodec, MAX_IMAGE_SIZE, MAX_METADATA_SIZE, WireFrame};
pub use receiver::FrameReceiver;
