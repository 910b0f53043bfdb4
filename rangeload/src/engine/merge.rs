//! Segment merger.
//!
//! Concatenates completed segment files into the destination in ascending
//! range order. Segment files are removed whether or not the merge
//! succeeds. A merge that fails after creating the destination also removes
//! it, so a record in `Error` never leaves a truncated artifact behind.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use super::record::Segment;
use super::transfer::discard;
use crate::error::{EngineError, EngineResult};

/// Concatenate `segments` into `destination` and delete the segment files.
///
/// Returns the number of bytes written.
pub fn merge_segments(segments: &[Segment], destination: &Path) -> EngineResult<u64> {
    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.range.start);

    let result = match File::create(destination) {
        Ok(output) => concatenate(&ordered, output, destination).map_err(|reason| {
            discard(destination);
            reason
        }),
        Err(e) => Err(format!("cannot create {}: {}", destination.display(), e)),
    };

    for segment in &ordered {
        discard(&segment.path);
    }

    match result {
        Ok(bytes) => {
            debug!(
                destination = %destination.display(),
                segments = ordered.len(),
                bytes,
                "Merged segments"
            );
            Ok(bytes)
        }
        Err(reason) => Err(EngineError::Merge {
            path: destination.to_path_buf(),
            reason,
        }),
    }
}

fn concatenate(segments: &[&Segment], output: File, destination: &Path) -> Result<u64, String> {
    let mut writer = BufWriter::new(output);
    let mut total = 0u64;

    for segment in segments {
        let mut input = File::open(&segment.path)
            .map_err(|e| format!("cannot open {}: {}", segment.path.display(), e))?;
        let copied = io::copy(&mut input, &mut writer)
            .map_err(|e| format!("cannot copy {}: {}", segment.path.display(), e))?;

        if copied != segment.range.len() {
            return Err(format!(
                "segment {} holds {} bytes, expected {}",
                segment.path.display(),
                copied,
                segment.range.len()
            ));
        }
        total += copied;
    }

    writer
        .flush()
        .map_err(|e| format!("cannot flush {}: {}", destination.display(), e))?;

    Ok(total)
}

/// Remove every segment file that still exists.
pub fn remove_segment_files(segments: &[Segment]) {
    for segment in segments {
        discard(&segment.path);
    }
}
