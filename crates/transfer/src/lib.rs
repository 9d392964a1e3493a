//! Sender and receiver roles for single-file transfers through a relay.
//!
//! Both roles connect to the relay and present the same token. The sender
//! waits for the relay's ready signal, then writes the metadata frame and
//! the file body and closes. The receiver reads the frame, then exactly the
//! declared number of body bytes, into a freshly created local file.

mod error;
mod progress;
mod receiver;
mod sender;
mod target;

pub use error::TransferError;
pub use progress::{Progress, SpeedCalculator};
pub use receiver::{ReceiveReport, Receiver, ReceiverState};
pub use sender::{SendReport, Sender, SenderState};
pub use target::{create_target, validate_file_name};

use std::time::Duration;

/// Timeout for the TCP connection attempt to the relay.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on the receiver's trailing drain read.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);
