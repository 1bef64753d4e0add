use std::path::Path;

use tempfile::TempPath;

use crate::error::{Result, SongwaveError};

/// A private copy of the user's audio file. Deleted when dropped, whether the
/// job succeeded or not.
pub struct StagedAudio {
    path: TempPath,
}

impl StagedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Copy `source` into a temporary file that keeps the source extension, so the
/// decoder and ffmpeg can still sniff the container from its name.
pub fn stage(source: &Path) -> Result<StagedAudio> {
    if !source.is_file() {
        return Err(SongwaveError::Input(format!(
            "audio file not found: {}",
            source.display()
        )));
    }

    let suffix = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| ".mp3".to_string());

    let mut tmp = tempfile::Builder::new()
        .prefix("songwave-upload-")
        .suffix(&suffix)
        .tempfile()?;
    let mut src = std::fs::File::open(source)?;
    let bytes = std::io::copy(&mut src, tmp.as_file_mut())?;

    log::debug!("Staged {} ({} bytes) at {}", source.display(), bytes, tmp.path().display());

    Ok(StagedAudio {
        path: tmp.into_temp_path(),
    })
}
