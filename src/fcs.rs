//! Frame Check Sequence helpers.
//!
//! Ethernet frames end in a CRC-32 over the whole frame. Running the
//! same CRC over a frame *including* a valid FCS leaves the fixed
//! residue `0x2144DF1C`, which is how we tell whether a captured frame
//! still carries its FCS or the tap overwrote it with a timestamp.

/// CRC-32 residue of a frame whose trailing FCS is intact.
pub const FCS_RESIDUE: u32 = 0x2144_DF1C;

/// CRC-32 (IEEE 802.3 polynomial) over a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// True if `frame` ends in a valid FCS.
pub fn has_valid_fcs(frame: &[u8]) -> bool {
    frame.len() >= 4 && crc32(frame) == FCS_RESIDUE
}
