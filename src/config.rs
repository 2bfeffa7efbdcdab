use std::time::Duration;

use anyhow::bail;

use crate::frame::{Channel, FRAME_HEADER_LEN};
use crate::reliable::SEGMENT_HEADER_LEN;

/// Immutable tuning values for one endpoint, fixed for the life of every
/// connection the endpoint creates. Each endpoint gets its own copy at
/// construction - there is no process-wide settings object.
#[derive(Debug, Clone)]
pub struct Config {
    /// This is the maximum datagram size this protocol will hand to the UDP
    ///  socket, including the frame header. The protocol never fragments at the
    ///  IP level, so this size (and the implied packet size) must be supported
    ///  by all network paths between the peers.
    ///
    /// With full Ethernet frames and no optional IP headers a safe value is
    ///  somewhat below 1472 for IPv4 and 1452 for IPv6; the default of 1200
    ///  leaves headroom for tunnels and surprising network hardware along the
    ///  way. Choosing this value too big causes datagrams to be dropped
    ///  silently on some routes, choosing it too small wastes bandwidth.
    pub mtu: usize,

    /// Maximum number of reliable segments in flight (sent but unacknowledged).
    pub send_window: u16,

    /// Maximum number of reliable segments buffered on the receiving side while
    ///  waiting for gaps to be filled. Also bounds the number of fragments a
    ///  single message may span, and with it the maximum reliable message size.
    pub receive_window: u16,

    /// The rate at which the host drives the two tick phases. Retransmission
    ///  timers never fire more finely than this.
    pub interval: Duration,

    /// Number of duplicate-ack skips that trigger an early retransmission of a
    ///  segment without waiting for its timer. 0 disables fast resend.
    pub fast_resend: u32,

    /// Trade bandwidth for latency: lowers the retransmission floor and backs
    ///  off more gently.
    pub no_delay: bool,

    /// Enables the congestion window (slow start, halving on loss). Off by
    ///  default - on a relay path latency spikes are usually worse than loss.
    pub congestion: bool,

    /// Number of transmissions of a single segment after which the link is
    ///  declared dead and the connection is torn down.
    pub dead_link: u32,

    /// A connection without any valid inbound traffic for this long is torn
    ///  down with a timeout error.
    pub timeout: Duration,

    /// Keepalive interval for the reliable ping, well below `timeout`.
    pub ping_interval: Duration,

    /// Upper bound for reliable segments waiting to enter the send window.
    ///  Sends beyond this fail instead of buffering without limit.
    pub send_queue_limit: usize,

    /// OS-level socket send buffer size, applied on start/connect.
    pub send_socket_buffer: usize,

    /// OS-level socket receive buffer size, applied on start/connect.
    pub receive_socket_buffer: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            mtu: 1200,
            send_window: 4096,
            receive_window: 4096,
            interval: Duration::from_millis(10),
            fast_resend: 2,
            no_delay: true,
            congestion: false,
            dead_link: 40,
            timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(1),
            send_queue_limit: 10_000,
            send_socket_buffer: 7 * 1024 * 1024,
            receive_socket_buffer: 7 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Fragments per message are bounded by the receive window and by the
    ///  countdown byte in the segment header.
    pub const MAX_FRAGMENTS: usize = 255;

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mtu <= FRAME_HEADER_LEN + SEGMENT_HEADER_LEN {
            bail!("mtu of {} leaves no room for payload", self.mtu);
        }
        if self.mtu > u16::MAX as usize {
            bail!("mtu of {} exceeds the maximum UDP payload", self.mtu);
        }
        if self.send_window == 0 || self.receive_window < 2 {
            bail!("send window must be at least 1 and receive window at least 2");
        }
        if self.interval.is_zero() {
            bail!("tick interval must not be zero");
        }
        if self.dead_link == 0 {
            bail!("dead link threshold must be at least 1");
        }
        if self.timeout.is_zero() || self.timeout <= self.ping_interval {
            bail!("timeout must be longer than the ping interval");
        }
        Ok(())
    }

    /// Payload bytes that fit into a single reliable segment.
    pub fn segment_payload_len(&self) -> usize {
        self.mtu - FRAME_HEADER_LEN - SEGMENT_HEADER_LEN
    }

    /// The largest payload an application may pass to `send` for the given
    ///  channel. The reliable bound is smaller per fragment (segment framing
    ///  reserves header space) but spans up to a window of fragments; one byte
    ///  is reserved for the control opcode.
    pub fn max_payload_size(&self, channel: Channel) -> usize {
        match channel {
            Channel::Reliable => {
                let max_fragments = Self::MAX_FRAGMENTS.min(self.receive_window as usize - 1);
                self.segment_payload_len() * max_fragments - 1
            }
            Channel::Unreliable => self.mtu - FRAME_HEADER_LEN - 1,
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[rstest]
    #[case::tiny_mtu(Config { mtu: 20, ..Config::default() })]
    #[case::huge_mtu(Config { mtu: 100_000, ..Config::default() })]
    #[case::no_send_window(Config { send_window: 0, ..Config::default() })]
    #[case::tiny_receive_window(Config { receive_window: 1, ..Config::default() })]
    #[case::zero_interval(Config { interval: Duration::ZERO, ..Config::default() })]
    #[case::zero_dead_link(Config { dead_link: 0, ..Config::default() })]
    #[case::timeout_below_ping(Config { timeout: Duration::from_millis(500), ..Config::default() })]
    fn test_validate_rejects(#[case] config: Config) {
        assert!(config.validate().is_err());
    }

    #[rstest]
    #[case::unreliable(Channel::Unreliable, 1200 - 5 - 1)]
    #[case::reliable(Channel::Reliable, (1200 - 5 - 20) * 255 - 1)]
    fn test_max_payload_size(#[case] channel: Channel, #[case] expected: usize) {
        assert_eq!(Config::default().max_payload_size(channel), expected);
    }

    #[test]
    fn test_max_payload_size_bounded_by_receive_window() {
        let config = Config { receive_window: 16, ..Config::default() };
        assert_eq!(config.max_payload_size(Channel::Reliable), (1200 - 5 - 20) * 15 - 1);
    }
}
