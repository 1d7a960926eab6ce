//! ODrive native protocol packets.
//!
//! Request: `seq u16 | endpoint u16 | response length u16 | payload | trailer u16`, all
//! little endian. Bit 15 of the endpoint field asks the device to acknowledge. The
//! trailer is the interface CRC, or [`PROTOCOL_VERSION`] when addressing endpoint 0.
//!
//! Response: `seq u16 | payload`, with bit 15 of `seq` set.

use crate::{Result, TransportError};

pub const PROTOCOL_VERSION: u16 = 1;
pub const ACK_FLAG: u16 = 0x8000;
pub const MAX_PACKET_SIZE: usize = 64;
const HEADER_LEN: usize = 6;
const TRAILER_LEN: usize = 2;

/// Monotonic sequence numbers, kept clear of the ack bit.
#[derive(Debug, Default, Clone)]
pub struct Sequencer {
    next: u16,
}

impl Sequencer {
    pub fn next(&mut self) -> u16 {
        let seq = self.next;
        self.next = (self.next + 1) & !ACK_FLAG;
        seq
    }
}

pub fn encode_request(
    seq: u16,
    endpoint: u16,
    response_len: u16,
    payload: &[u8],
    json_crc: u16,
) -> Result<Vec<u8>> {
    if endpoint & ACK_FLAG != 0 {
        return Err(TransportError::InvalidParam(format!(
            "endpoint id {endpoint} out of range"
        )));
    }
    if HEADER_LEN + payload.len() + TRAILER_LEN > MAX_PACKET_SIZE {
        return Err(TransportError::Overflow);
    }
    let trailer = if endpoint == 0 {
        PROTOCOL_VERSION
    } else {
        json_crc
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    out.extend_from_slice(&seq.to_le_bytes());
    out.extend_from_slice(&(endpoint | ACK_FLAG).to_le_bytes());
    out.extend_from_slice(&response_len.to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&trailer.to_le_bytes());
    Ok(out)
}

/// Extract the payload of a response to request `seq`.
///
/// Returns `Ok(None)` for a well-formed response to a different request, which the
/// caller should drop and keep reading.
pub fn parse_response(seq: u16, packet: &[u8]) -> Result<Option<&[u8]>> {
    if packet.len() < 2 {
        return Err(TransportError::Protocol("short response"));
    }
    let got = u16::from_le_bytes([packet[0], packet[1]]);
    if got & ACK_FLAG == 0 {
        return Err(TransportError::Protocol("response without ack flag"));
    }
    if got & !ACK_FLAG != seq {
        return Ok(None);
    }
    Ok(Some(&packet[2..]))
}

pub fn decode_f32(payload: &[u8]) -> Result<f32> {
    let bytes: [u8; 4] = payload
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(TransportError::Protocol("short f32 payload"))?;
    Ok(f32::from_le_bytes(bytes))
}

pub fn decode_u32(payload: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = payload
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(TransportError::Protocol("short u32 payload"))?;
    Ok(u32::from_le_bytes(bytes))
}

pub fn decode_u64(payload: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = payload
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(TransportError::Protocol("short u64 payload"))?;
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let pkt = encode_request(0x0102, 0x0033, 4, &[0xAA, 0xBB], 0x9B40).unwrap();
        assert_eq!(
            pkt,
            vec![0x02, 0x01, 0x33, 0x80, 0x04, 0x00, 0xAA, 0xBB, 0x40, 0x9B]
        );
    }

    #[test]
    fn test_endpoint_zero_uses_protocol_version() {
        let pkt = encode_request(7, 0, 64, &[], 0x9B40).unwrap();
        assert_eq!(&pkt[pkt.len() - 2..], &PROTOCOL_VERSION.to_le_bytes());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = [0u8; MAX_PACKET_SIZE];
        assert_eq!(
            encode_request(1, 5, 0, &payload, 0),
            Err(TransportError::Overflow)
        );
    }

    #[test]
    fn test_parse_response_matches_sequence() {
        let pkt = [0x05, 0x80, 0x00, 0x00, 0xC0, 0x3F];
        let payload = parse_response(5, &pkt).unwrap().unwrap();
        assert_eq!(decode_f32(payload).unwrap(), 1.5);
        assert_eq!(parse_response(6, &pkt).unwrap(), None);
        assert!(parse_response(5, &[0x05, 0x00]).is_err());
        assert!(parse_response(5, &[0x05]).is_err());
    }

    #[test]
    fn test_sequencer_skips_ack_bit() {
        let mut seq = Sequencer { next: 0x7FFF };
        assert_eq!(seq.next(), 0x7FFF);
        assert_eq!(seq.next(), 0);
    }
}
