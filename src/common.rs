use std::time::Duration;

/// Marks the start of a frame on the wire ('{')
pub const START_TAG: u8 = 0x7B;

/// Marks the end of a frame on the wire ('}')
pub const STOP_TAG: u8 = 0x7D;

/// Precedes any payload byte that collides with a framing tag ('\\')
pub const ESCAPE_TAG: u8 = 0x5C;

/// Sole byte of an acknowledgment frame
pub const ACK_TAG: u8 = 0x06;

/// Application bytes carried per data frame
pub const MAX_FRAME_SIZE: usize = 8;

/// Retransmission timeout for an unacknowledged frame
pub static RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Per-recipient bit flip probability of the low-noise medium
pub static LOW_NOISE_FLIP_P: f64 = 0.001;

/// Bit error rate in good state
pub static GOOD_STATE_BER: f64 = 1e-6;

/// Bit error rate in bad state
pub static BAD_STATE_BER: f64 = 5e-3;

/// Good to bad state transition probability
pub static P_G_TO_B: f64 = 0.002;

/// Bad to good state transition probability
pub static P_B_TO_G: f64 = 0.05;
