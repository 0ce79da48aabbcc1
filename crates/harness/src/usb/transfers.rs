//! Transfer payload synthesis
//!
//! The fake device never touches hardware; every transfer completes at once
//! with a deterministic payload so tests can assert exact bytes.

use protocol::{
    ControlInResult, ControlSetup, InTransferResult, IsoInResult, IsoOutResult, IsoPacketResult,
    OutTransferResult, TransferStatus,
};

/// Largest payload a single IN transfer may synthesize, well inside one frame
pub const MAX_TRANSFER_LENGTH: u64 = 16 * 1024 * 1024;

/// Most packets one isochronous transfer may carry
pub const MAX_ISO_PACKETS: usize = 1 << 16;

/// Whether a control request may reach its recipient
///
/// Interface and endpoint recipients only exist once a configuration is
/// selected; a device-level request is always accepted.
pub fn control_permitted(setup: &ControlSetup, configured: bool) -> bool {
    configured || !setup.recipient.requires_configuration()
}

/// Echo of a control IN request
///
/// Layout: requested length (big-endian), bRequest, wValue (big-endian),
/// wIndex (big-endian).
pub fn control_in_payload(setup: &ControlSetup, length: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(7);
    data.extend_from_slice(&length.to_be_bytes());
    data.push(setup.request);
    data.extend_from_slice(&setup.value.to_be_bytes());
    data.extend_from_slice(&setup.index.to_be_bytes());
    data
}

/// Result of a control IN transfer
pub fn control_in(setup: &ControlSetup, length: u16, configured: bool) -> ControlInResult {
    if !control_permitted(setup, configured) {
        return ControlInResult::permission_denied();
    }
    ControlInResult {
        status: TransferStatus::Ok,
        data: Some(control_in_payload(setup, length)),
    }
}

/// Result of a control OUT transfer
pub fn control_out(setup: &ControlSetup, data: &[u8], configured: bool) -> OutTransferResult {
    if !control_permitted(setup, configured) {
        return OutTransferResult::permission_denied();
    }
    written(data)
}

/// `length` bytes counting up from 0 and wrapping at 256
pub fn pattern(length: usize) -> impl Iterator<Item = u8> {
    (0..length).map(|j| (j & 0xFF) as u8)
}

/// Isochronous IN: one counting pattern per packet, concatenated
pub fn isochronous_in(packet_lengths: &[u32]) -> IsoInResult {
    let total: usize = packet_lengths.iter().map(|&len| len as usize).sum();
    let mut data = Vec::with_capacity(total);
    for &len in packet_lengths {
        data.extend(pattern(len as usize));
    }

    IsoInResult {
        data,
        packets: completed_packets(packet_lengths),
    }
}

/// Isochronous OUT: every packet reported fully transferred
pub fn isochronous_out(packet_lengths: &[u32]) -> IsoOutResult {
    IsoOutResult {
        packets: completed_packets(packet_lengths),
    }
}

fn completed_packets(packet_lengths: &[u32]) -> Vec<IsoPacketResult> {
    packet_lengths
        .iter()
        .map(|&length| IsoPacketResult {
            length,
            transferred_length: length,
            status: TransferStatus::Ok,
        })
        .collect()
}

/// Bulk IN: a single counting pattern of the requested length
pub fn bulk_in(length: u32) -> InTransferResult {
    InTransferResult {
        status: TransferStatus::Ok,
        data: pattern(length as usize).collect(),
    }
}

/// Successful OUT of the whole buffer
pub fn written(data: &[u8]) -> OutTransferResult {
    OutTransferResult {
        status: TransferStatus::Ok,
        bytes_written: u32::try_from(data.len()).unwrap_or(u32::MAX),
    }
}
