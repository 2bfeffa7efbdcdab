use bytes::{Buf, BufMut, BytesMut};
use bytes_varint::{VarIntSupport, VarIntSupportMut};


pub fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_usize_varint(s.len());
    buf.put_slice(s.as_bytes());
}

pub fn try_get_string(buf: &mut impl Buf) -> anyhow::Result<String> {
    let len = buf.try_get_usize_varint()?;
    if buf.remaining() < len {
        anyhow::bail!("string of {} bytes announced but only {} available", len, buf.remaining());
    }

    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    Ok(String::from_utf8(raw)?)
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty("")]
    #[case::short("abc")]
    #[case::umlaut("öäü")]
    #[case::long("a long string that needs a two-byte varint length prefix because it exceeds a hundred and twenty seven bytes of utf-8 encoded text data")]
    fn test_string_round_trip(#[case] s: &str) {
        let mut buf = BytesMut::new();
        put_string(&mut buf, s);
        let mut read_buf: &[u8] = buf.as_ref();
        assert_eq!(try_get_string(&mut read_buf).unwrap(), s);
        assert!(read_buf.is_empty());
    }

    #[rstest]
    #[case::missing_length(b"".as_slice())]
    #[case::truncated_payload(b"\x05ab".as_slice())]
    #[case::invalid_utf8(b"\x02\xff\xfe".as_slice())]
    fn test_string_invalid(#[case] mut buf: &[u8]) {
        assert!(try_get_string(&mut buf).is_err());
    }
}
