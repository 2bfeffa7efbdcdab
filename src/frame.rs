use anyhow::anyhow;
use bytes::{Buf, BufMut, BytesMut};
use bytes_varint::try_get_fixed::TryGetFixedSupport;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// channel tag + cookie, prepended to every datagram between two endpoints
pub const FRAME_HEADER_LEN: usize = 5;

/// Selects the delivery semantics of a payload. Carried as the first byte of
/// every frame - not an owned entity, just a stateless selector.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Channel {
    Reliable = 1,
    Unreliable = 2,
}

/// First byte of a reassembled reliable message.
///
/// The very first message a client sends is `Connect` with the frame cookie
/// still 0 - it signals handshake initiation rather than carrying application
/// data. The server answers with its own `Connect` once it has minted a cookie.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ReliableOpcode {
    Connect = 1,
    Ping = 2,
    Data = 3,
    Disconnect = 4,
}

/// First byte of an unreliable payload.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum UnreliableOpcode {
    Data = 1,
    Disconnect = 2,
}

/// The fixed outer framing: `[channel: u8][cookie: u32 BE]`, followed by the
/// channel's payload. A pure transform - no side effects, no state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameHeader {
    pub channel: Channel,
    pub cookie: u32,
}
impl FrameHeader {
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.channel.into());
        buf.put_u32(self.cookie);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<FrameHeader> {
        let raw_channel = buf.try_get_u8()?;
        let channel = Channel::try_from(raw_channel)
            .map_err(|_| anyhow!("unknown channel tag {}", raw_channel))?;
        let cookie = buf.try_get_u32()?;
        Ok(FrameHeader { channel, cookie })
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::reliable(Channel::Reliable, 0, b"xyz")]
    #[case::unreliable(Channel::Unreliable, 0x12345678, b"")]
    #[case::max_cookie(Channel::Reliable, u32::MAX, b"\x00\x01")]
    fn test_frame_header_round_trip(#[case] channel: Channel, #[case] cookie: u32, #[case] payload: &[u8]) {
        let mut buf = BytesMut::new();
        FrameHeader { channel, cookie }.ser(&mut buf);
        buf.put_slice(payload);
        assert_eq!(buf.len(), FRAME_HEADER_LEN + payload.len());

        let mut read_buf: &[u8] = buf.as_ref();
        let header = FrameHeader::deser(&mut read_buf).unwrap();
        assert_eq!(header, FrameHeader { channel, cookie });
        assert_eq!(read_buf, payload);
    }

    #[rstest]
    #[case::wire_layout(Channel::Reliable, 0x01020304, b"\x01\x01\x02\x03\x04".as_slice())]
    #[case::unreliable_tag(Channel::Unreliable, 0, b"\x02\x00\x00\x00\x00".as_slice())]
    fn test_frame_header_wire_layout(#[case] channel: Channel, #[case] cookie: u32, #[case] expected: &[u8]) {
        let mut buf = BytesMut::new();
        FrameHeader { channel, cookie }.ser(&mut buf);
        assert_eq!(buf.as_ref(), expected);
    }

    #[rstest]
    #[case::empty(b"".as_slice())]
    #[case::one_byte(b"\x01".as_slice())]
    #[case::four_bytes(b"\x01\x00\x00\x00".as_slice())]
    fn test_frame_header_below_minimum_length(#[case] mut buf: &[u8]) {
        assert!(FrameHeader::deser(&mut buf).is_err());
    }

    #[rstest]
    #[case::zero(0)]
    #[case::three(3)]
    #[case::high(255)]
    fn test_frame_header_unknown_channel(#[case] tag: u8) {
        let raw = [tag, 0, 0, 0, 0];
        let mut buf: &[u8] = &raw;
        assert!(FrameHeader::deser(&mut buf).is_err());
    }
}
