//! Segment planning.
//!
//! A resource is split into byte ranges only when the server accepts range
//! requests, the size is known, and more than one thread per download is
//! allowed. The ranges are equal spans with the last one absorbing the
//! remainder, so together they cover `[0, total_size - 1]` exactly.

use std::path::{Path, PathBuf};

use super::record::{ByteRange, Segment};

/// How a record will be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentPlan {
    /// One request without a `Range` header.
    Single,
    /// One request per range, fetched in parallel.
    Ranged(Vec<ByteRange>),
}

impl SegmentPlan {
    /// Number of transfers this plan starts.
    pub fn transfer_count(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::Ranged(ranges) => ranges.len(),
        }
    }
}

/// `min(max_threads, max(1, total_size / chunk_size))`.
pub fn segment_count(total_size: u64, max_threads: usize, chunk_size: u64) -> usize {
    let by_size = (total_size / chunk_size.max(1)).max(1);
    (max_threads.max(1) as u64).min(by_size) as usize
}

/// Divide `[0, total_size - 1]` into `count` contiguous spans.
///
/// Returns no ranges when `total_size` is 0. `count` is capped at
/// `total_size` so no span is empty.
pub fn split_ranges(total_size: u64, count: usize) -> Vec<ByteRange> {
    if total_size == 0 {
        return Vec::new();
    }

    let count = (count.max(1) as u64).min(total_size);
    let span = total_size / count;

    (0..count)
        .map(|i| {
            let start = i * span;
            let end = if i == count - 1 {
                total_size - 1
            } else {
                start + span - 1
            };
            ByteRange::new(start, end)
        })
        .collect()
}

/// Decide between a single stream and parallel ranges.
///
/// A computed count of one falls back to [`SegmentPlan::Single`].
pub fn plan(
    total_size: u64,
    accepts_ranges: bool,
    max_threads: usize,
    chunk_size: u64,
) -> SegmentPlan {
    if !accepts_ranges || total_size == 0 || max_threads <= 1 {
        return SegmentPlan::Single;
    }

    match segment_count(total_size, max_threads, chunk_size) {
        0 | 1 => SegmentPlan::Single,
        count => SegmentPlan::Ranged(split_ranges(total_size, count)),
    }
}

/// Temp file for segment `index`: `<filename>.part<index>` next to the destination.
pub fn segment_path(save_dir: &Path, filename: &str, index: usize) -> PathBuf {
    save_dir.join(format!("{}.part{}", filename, index))
}

/// Build the segment table for `ranges`.
pub fn build_segments(save_dir: &Path, filename: &str, ranges: &[ByteRange]) -> Vec<Segment> {
    ranges
        .iter()
        .enumerate()
        .map(|(index, range)| Segment::new(index, *range, segment_path(save_dir, filename, index)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_ten_mib_four_threads() {
        let plan = plan(10 * MIB, true, 4, MIB);
        assert_eq!(
            plan,
            SegmentPlan::Ranged(vec![
                ByteRange::new(0, 2_621_439),
                ByteRange::new(2_621_440, 5_242_879),
                ByteRange::new(5_242_880, 7_864_319),
                ByteRange::new(7_864_320, 10_485_759),
            ])
        );
        assert_eq!(plan.transfer_count(), 4);
    }

    #[test]
    fn test_last_span_absorbs_remainder() {
        let ranges = split_ranges(10, 3);
        assert_eq!(
            ranges,
            vec![
                ByteRange::new(0, 2),
                ByteRange::new(3, 5),
                ByteRange::new(6, 9)
            ]
        );
    }

    #[test]
    fn test_single_when_ranges_unsupported() {
        assert_eq!(plan(10 * MIB, false, 4, MIB), SegmentPlan::Single);
    }

    #[test]
    fn test_single_when_size_unknown() {
        assert_eq!(plan(0, true, 4, MIB), SegmentPlan::Single);
    }

    #[test]
    fn test_single_when_one_thread() {
        assert_eq!(plan(10 * MIB, true, 1, MIB), SegmentPlan::Single);
    }

    #[test]
    fn test_single_when_smaller_than_chunk() {
        assert_eq!(segment_count(MIB / 2, 4, MIB), 1);
        assert_eq!(plan(MIB / 2, true, 4, MIB), SegmentPlan::Single);
    }

    #[test]
    fn test_count_limited_by_size() {
        assert_eq!(segment_count(2 * MIB + 10, 8, MIB), 2);
        assert_eq!(segment_count(100 * MIB, 8, MIB), 8);
    }

    #[test]
    fn test_split_zero_total() {
        assert!(split_ranges(0, 4).is_empty());
    }

    #[test]
    fn test_split_caps_count_at_total() {
        let ranges = split_ranges(2, 5);
        assert_eq!(ranges, vec![ByteRange::new(0, 0), ByteRange::new(1, 1)]);
    }

    #[test]
    fn test_segment_paths() {
        let segments = build_segments(
            Path::new("/downloads"),
            "movie.mkv",
            &split_ranges(100, 2),
        );
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].path, PathBuf::from("/downloads/movie.mkv.part0"));
        assert_eq!(segments[1].path, PathBuf::from("/downloads/movie.mkv.part1"));
        assert_eq!(segments[1].index, 1);
        assert_eq!(segments[1].downloaded, 0);
    }

    fn assert_exact_cover(ranges: &[ByteRange], total_size: u64) {
        if total_size == 0 {
            assert!(ranges.is_empty());
            return;
        }
        assert_eq!(ranges.first().map(|r| r.start), Some(0));
        assert_eq!(ranges.last().map(|r| r.end), Some(total_size - 1));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start, "gap or overlap in {:?}", pair);
        }
        assert_eq!(ranges.iter().map(ByteRange::len).sum::<u64>(), total_size);
    }

    proptest! {
        #[test]
        fn prop_split_covers_exactly(total_size in 0u64..50_000_000, count in 1usize..64) {
            let ranges = split_ranges(total_size, count);
            assert_exact_cover(&ranges, total_size);
            prop_assert!(ranges.len() <= count);
        }

        #[test]
        fn prop_plan_covers_exactly(
            total_size in 0u64..200_000_000,
            threads in 1usize..16,
            chunk_size in 1u64..(8 * MIB),
        ) {
            match plan(total_size, true, threads, chunk_size) {
                SegmentPlan::Single => {
                    prop_assert!(
                        total_size == 0
                            || threads == 1
                            || segment_count(total_size, threads, chunk_size) == 1
                    );
                }
                SegmentPlan::Ranged(ranges) => {
                    prop_assert!(ranges.len() > 1);
                    prop_assert!(ranges.len() <= threads);
                    assert_exact_cover(&ranges, total_size);
                }
            }
        }
    }
}
