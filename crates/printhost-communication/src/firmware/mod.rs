//! Firmware protocol implementations
//!
//! One module per firmware family. The RepRap family (Marlin, Repetier and
//! friends) speaks line-numbered, checksummed G-code with `ok`/`Resend`
//! acknowledgements; that is the only family this host targets.

pub mod reprap;
