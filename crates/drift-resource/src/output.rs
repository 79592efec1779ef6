//! Version emission on stdout.

use std::io::{self, Write};

use drift_core::Version;

/// Write `versions` as a single-line JSON array of `{"ref": ...}` objects.
pub fn write_versions<W: Write>(mut writer: W, versions: &[Version]) -> io::Result<()> {
    serde_json::to_writer(&mut writer, versions)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
