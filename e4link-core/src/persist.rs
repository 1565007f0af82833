//! Writing buffered readings to disk.
//!
//! Two formats:
//! - **Channel dump** (no windowing): a text file with one section per
//!   channel, `# <Channel>` header then `timestamp,value` rows.
//! - **Window history** (windowing): `bincode` of `Vec<WindowRecord>`,
//!   or JSON when the path ends in `.json`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::device::DeviceRecord;
use crate::error::E4Error;
use crate::stream::Channel;
use crate::window::WindowRecord;

/// Write every channel buffer of `device` as delimited text.
pub fn save_channels(device: &DeviceRecord, path: &Path) -> Result<(), E4Error> {
    let mut out = BufWriter::new(File::create(path).map_err(E4Error::File)?);
    write_channels(device, &mut out)
        .and_then(|()| out.flush())
        .map_err(E4Error::File)?;
    tracing::info!(path = %path.display(), "channel readings saved");
    Ok(())
}

fn write_channels(device: &DeviceRecord, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "# device {}", device.name())?;
    for channel in Channel::ALL {
        writeln!(out, "# {channel}")?;
        match device.channel(channel) {
            Some(buf) => {
                for (ts, value) in buf.iter() {
                    writeln!(out, "{ts},{value}")?;
                }
            }
            None => {
                let acc = device.acc();
                for (i, ts) in acc.timestamps().iter().enumerate() {
                    writeln!(out, "{ts},{},{},{}", acc.x()[i], acc.y()[i], acc.z()[i])?;
                }
            }
        }
    }
    Ok(())
}

/// Serialize the window history.
pub fn save_windows(windows: &[WindowRecord], path: &Path) -> Result<(), E4Error> {
    let mut out = BufWriter::new(File::create(path).map_err(E4Error::File)?);
    if is_json(path) {
        serde_json::to_writer(&mut out, windows)?;
    } else {
        bincode::serialize_into(&mut out, windows)?;
    }
    out.flush().map_err(E4Error::File)?;
    tracing::info!(path = %path.display(), count = windows.len(), "window readings saved");
    Ok(())
}

/// Read back a file written by [`save_windows`].
pub fn load_windows(path: &Path) -> Result<Vec<WindowRecord>, E4Error> {
    let reader = BufReader::new(File::open(path).map_err(E4Error::File)?);
    if is_json(path) {
        Ok(serde_json::from_reader(reader)?)
    } else {
        Ok(bincode::deserialize_from(reader)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
