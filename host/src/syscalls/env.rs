//! Arguments, environment, clocks and randomness.

use wiggle::{GuestMemory, GuestPtr};

use crate::{bindings::types, state::WasiState, vfs::unix_nanos};

impl WasiState {
    /// Read clock in nanoseconds.
    pub(super) fn clock_now(&self, id: types::Clockid) -> u64 {
        match id {
            types::Clockid::Realtime => unix_nanos(),
            types::Clockid::Monotonic
            | types::Clockid::ProcessCputimeId
            | types::Clockid::ThreadCputimeId => {
                u64::try_from(self.clock_origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
            }
        }
    }
}

/// Write NUL-terminated `strings` to `buf` and a pointer to each of them to `starts`.
pub(super) fn write_string_table<'a>(
    memory: &mut GuestMemory<'_>,
    mut starts: GuestPtr<GuestPtr<u8>>,
    buf: GuestPtr<u8>,
    strings: impl Iterator<Item = &'a [u8]>,
) -> Result<(), types::Error> {
    let mut cursor = buf;
    for s in strings {
        memory.write(starts, cursor)?;
        starts = starts.add(1)?;

        let len = u32::try_from(s.len())?;
        memory.copy_from_slice(s, cursor.as_array(len))?;
        cursor = cursor.add(len)?;
        memory.write(cursor, 0u8)?;
        cursor = cursor.add(1)?;
    }
    Ok(())
}
