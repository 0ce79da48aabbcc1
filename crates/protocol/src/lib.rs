//! Protocol library for the WebUSB fake-device harness
//!
//! This crate defines the descriptor model of a fake USB device, the
//! parameter and result types of every device operation, and the
//! request/reply messages a binding exchanges with the dispatch host.
//! Messages are serialized with postcard and framed with a length prefix.
//!
//! # Example
//!
//! ```
//! use protocol::{Message, MessagePayload, Operation, CURRENT_VERSION};
//! use protocol::{DeviceId, RequestId, decode_message, encode_framed};
//!
//! let msg = Message {
//!     version: CURRENT_VERSION,
//!     payload: MessagePayload::OperationRequest {
//!         id: RequestId(1),
//!         device: DeviceId(1),
//!         operation: Operation::ClaimInterface { interface_number: 0 },
//!     },
//! };
//!
//! let framed = encode_framed(&msg).unwrap();
//! let decoded = decode_message(&framed[4..]).unwrap();
//! assert_eq!(decoded.version, CURRENT_VERSION);
//! ```

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod messages;
pub mod types;
pub mod version;

pub use codec::{MAX_FRAME_SIZE, decode_message, encode_framed, encode_message, validate_version};

#[cfg(feature = "async")]
pub use codec::{read_framed_async, write_framed_async};
pub use descriptor::{
    AlternateDescriptor, ConfigurationDescriptor, DescriptorError, DeviceDescriptor,
    InterfaceDescriptor,
};
pub use error::{ProtocolError, Result};
pub use messages::{
    FailureKind, Message, MessagePayload, Operation, OperationError, OperationReply,
};
pub use types::{
    CommandResult, ConfigurationValue, ControlInResult, ControlSetup, DeviceId, DeviceInfo,
    InTransferResult, IsoInResult, IsoOutResult, IsoPacketResult, OutTransferResult, Recipient,
    RequestId, RequestType, TransferStatus,
};
pub use version::{CURRENT_VERSION, ProtocolVersion};
