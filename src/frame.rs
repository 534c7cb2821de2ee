use embedded_can::{ExtendedId, Id, StandardId};

/// A fixed-layout frame on the decentralized LV bus.
///
/// Every message in the system is exactly 8 data bytes tagged with a CAN
/// identifier; boards with fewer than 8 bytes of state zero-fill the
/// remainder. Frames are immutable once constructed: encode builds one,
/// decode consumes one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LvFrame {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    id: Id,
    data: [u8; 8],
}

impl LvFrame {
    pub fn new(id: impl Into<Id>, data: [u8; 8]) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Builds a frame from a raw identifier value, picking the standard or
    /// extended format based on range.
    pub fn from_raw(id: u32, data: [u8; 8]) -> Result<Self, AddressError> {
        let id = raw_to_id(id)?;
        Ok(Self { id, data })
    }

    /// Gets the bus identifier of the frame
    pub fn id(&self) -> Id {
        self.id
    }

    /// The identifier as its raw integer value, regardless of format.
    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw(),
        }
    }

    /// Gets the full 8-byte payload of the frame
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }
}

/// Maps a raw identifier into [`Id`]: values within 11 bits become standard
/// IDs, values within 29 bits extended IDs.
pub fn raw_to_id(raw: u32) -> Result<Id, AddressError> {
    if raw <= StandardId::MAX.as_raw() as u32 {
        // Range checked above, the unwrap can't fire.
        return Ok(Id::Standard(StandardId::new(raw as u16).unwrap()));
    }

    ExtendedId::new(raw)
        .map(Id::Extended)
        .ok_or(AddressError::OutOfRange(raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressError {
    #[error("Received a CAN address ({0:?}) that was out of the valid extended range (0..=0x1FFFFFFF)")]
    OutOfRange(u32),
}

/// Const constructor for the agreed board addresses. Panics at compile time
/// if the value does not fit in a standard identifier.
pub(crate) const fn standard_id(raw: u16) -> StandardId {
    match StandardId::new(raw) {
        Some(id) => id,
        None => panic!("address does not fit in a standard CAN ID"),
    }
}

impl embedded_can::Frame for LvFrame {
    /// Creates a data frame; payloads shorter than 8 bytes are zero-padded
    /// to the fixed LV layout. Payloads longer than 8 bytes return `None`.
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }

        let mut copy = [0u8; 8];
        copy[..data.len()].copy_from_slice(data);

        Some(Self::new(id, copy))
    }

    /// Remote frames do not exist on the LV bus.
    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        8
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use embedded_can::Frame;

    use super::*;

    #[test]
    fn raw_ids_pick_the_narrowest_format() {
        let frame = LvFrame::from_raw(0x99, [0; 8]).unwrap();
        assert_eq!(frame.id(), Id::Standard(StandardId::new(0x99).unwrap()));
        assert_eq!(frame.raw_id(), 0x99);

        let frame = LvFrame::from_raw(0x1234_5678, [0; 8]).unwrap();
        assert_eq!(
            frame.id(),
            Id::Extended(ExtendedId::new(0x1234_5678).unwrap())
        );
        assert_eq!(frame.raw_id(), 0x1234_5678);
    }

    #[test]
    fn rejects_ids_beyond_29_bits() {
        assert_eq!(
            LvFrame::from_raw(0x2FFF_FFFF, [0; 8]),
            Err(AddressError::OutOfRange(0x2FFF_FFFF))
        );
    }

    #[test]
    fn short_payloads_are_zero_padded() {
        let frame = <LvFrame as Frame>::new(StandardId::new(0x95).unwrap(), &[1, 2]).unwrap();
        assert_eq!(frame.data(), &[1, 2, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Frame::dlc(&frame), 8);
    }

    #[test]
    fn remote_frames_are_refused() {
        assert!(<LvFrame as Frame>::new_remote(StandardId::new(0x95).unwrap(), 8).is_none());
    }
}
