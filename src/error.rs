use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Classifies connection-level faults for the error notification callback.
///
/// Transport-internal faults (transient socket errors, single lost packets,
/// malformed datagrams) are recovered locally and never reported through this
/// enum - only faults that affect a connection's lifecycle or an application
/// call surface here.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ErrorCode {
    /// address lookup failed during connect
    Resolution = 1,
    /// no traffic within the configured idle timeout
    Timeout = 2,
    /// a reliable segment exceeded its retransmission budget
    DeadLink = 3,
    /// a datagram carried a cookie that does not belong to this session
    CookieMismatch = 4,
    MalformedFrame = 5,
    PayloadTooLarge = 6,
    /// the reliable send queue is at capacity
    SendBufferFull = 7,
    SocketFatal = 8,
    Unexpected = 9,
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::resolution(1, Some(ErrorCode::Resolution))]
    #[case::socket_fatal(8, Some(ErrorCode::SocketFatal))]
    #[case::unassigned(0, None)]
    #[case::out_of_range(200, None)]
    fn test_error_code_from_raw(#[case] raw: u8, #[case] expected: Option<ErrorCode>) {
        assert_eq!(ErrorCode::try_from(raw).ok(), expected);
    }
}
