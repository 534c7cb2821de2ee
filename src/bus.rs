use embedded_can::{Frame, Id};

use crate::frame::LvFrame;

/// Transport boundary between the board state objects and the physical CAN
/// controller.
///
/// The core never blocks on bus I/O: `receive` must return immediately and
/// `transmit` is fire-and-forget. A saturated bus layer drops the frame
/// without reporting it. The configuration calls are outside the hot path
/// and default to no-ops for controllers that cannot honor them.
pub trait LvBus {
    fn transmit(&mut self, frame: &LvFrame);

    /// Polls the controller for one pending frame, `None` when nothing is
    /// waiting.
    fn receive(&mut self) -> Option<LvFrame>;

    fn set_bitrate(&mut self, _bitrate: Bitrate) {}

    fn add_address_filter(&mut self, _address: Id) {}
}

/// The nominal bit rates the LV network is run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bitrate {
    /// Transmits and receives at 50 Kbit/s
    Rate50Kbit,
    /// Transmits and receives at 100 Kbit/s
    Rate100Kbit,
    /// Transmits and receives at 125 Kbit/s
    Rate125Kbit,
    /// Transmits and receives at 200 Kbit/s
    Rate200Kbit,
    /// Transmits and receives at 250 Kbit/s
    Rate250Kbit,
    /// Transmits and receives at 500 Kbit/s
    #[default]
    Rate500Kbit,
    /// Transmits and receives at 1 Mbit/s
    Rate1Mbit,
}

impl Bitrate {
    pub const fn bps(self) -> u32 {
        match self {
            Self::Rate50Kbit => 50_000,
            Self::Rate100Kbit => 100_000,
            Self::Rate125Kbit => 125_000,
            Self::Rate200Kbit => 200_000,
            Self::Rate250Kbit => 250_000,
            Self::Rate500Kbit => 500_000,
            Self::Rate1Mbit => 1_000_000,
        }
    }
}

/// Adapter over any controller exposing the non-blocking
/// [`embedded_can::nb::Can`] trait. This is the hot-path transport: a
/// `WouldBlock` (or any controller error) reads as "no message pending".
pub struct NbCan<C>(pub C);

impl<C: embedded_can::nb::Can> LvBus for NbCan<C> {
    fn transmit(&mut self, frame: &LvFrame) {
        if let Some(tx) = C::Frame::new(frame.id(), LvFrame::data(frame)) {
            let _ = self.0.transmit(&tx);
        }
    }

    fn receive(&mut self) -> Option<LvFrame> {
        match self.0.receive() {
            Ok(rx) => convert_received(&rx),
            Err(_) => None,
        }
    }
}

/// Adapter over controllers that only expose the blocking
/// [`embedded_can::blocking::Can`] trait. `receive` blocks until the
/// controller hands over a frame, so poll-driven hosts should prefer
/// [`NbCan`] where the HAL offers it.
pub struct BlockingCan<C>(pub C);

impl<C: embedded_can::blocking::Can> LvBus for BlockingCan<C> {
    fn transmit(&mut self, frame: &LvFrame) {
        if let Some(tx) = C::Frame::new(frame.id(), LvFrame::data(frame)) {
            let _ = self.0.transmit(&tx);
        }
    }

    fn receive(&mut self) -> Option<LvFrame> {
        match self.0.receive() {
            Ok(rx) => convert_received(&rx),
            Err(_) => None,
        }
    }
}

/// Copies a received HAL frame into the fixed LV layout. Remote frames and
/// frames carrying the all-zero identifier are discarded; controllers have
/// been seen reporting success with a zeroed ID on a malformed frame.
fn convert_received<F: Frame>(rx: &F) -> Option<LvFrame> {
    if rx.is_remote_frame() {
        return None;
    }

    let frame = <LvFrame as Frame>::new(rx.id(), rx.data())?;

    if frame.raw_id() == 0 {
        return None;
    }

    Some(frame)
}
