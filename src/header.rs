//! Interfile-style ASCII header written next to each sinogram file.
//!
//! One `key := value` pair per line, keys prefixed with `!` are mandatory
//! Interfile keys and keys prefixed with `%` are scanner extensions.

use crate::acquisition::{Channel, SinogramMode};
use crate::geometry::ScannerGeometry;
use crate::session::state::ScanEndReason;
use crate::tags::SinglesSummary;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::time::Duration;

/// Everything the header describes about one stored channel.
#[derive(Debug, Clone)]
pub struct HeaderFields<'a> {
    /// Scanner the data came from
    pub geometry: &'a ScannerGeometry,
    /// Channel being described
    pub channel: Channel,
    /// File name of the binary sinogram data
    pub data_file: String,
    /// Radial bins per view
    pub projections: u32,
    /// Angular views
    pub views: u32,
    /// Sinograms in the channel
    pub sinograms: u32,
    /// Sinogram data type
    pub mode: SinogramMode,
    /// Zero-based frame index
    pub frame_index: usize,
    /// Scan time at frame start
    pub frame_start: Duration,
    /// Recorded frame duration
    pub frame_duration: Duration,
    /// Prompts binned in the frame
    pub prompts: u64,
    /// Randoms binned in the frame
    pub randoms: u64,
    /// Per-block singles at store time
    pub singles: &'a SinglesSummary,
    /// Local time the acquisition started
    pub study_time: DateTime<Local>,
    /// Why the frame ended
    pub end_reason: Option<ScanEndReason>,
}

/// Render the header text.
pub fn render(fields: &HeaderFields<'_>) -> String {
    let mut out = String::with_capacity(4096 + fields.singles.per_block.len() * 12);
    let geometry = fields.geometry;

    // Writing to a String cannot fail
    let mut line = |key: &str, value: &dyn std::fmt::Display| {
        let _ = writeln!(out, "{} := {}", key, value);
    };

    line("!INTERFILE", &"");
    line("!originating system", &geometry.name);
    line("!name of data file", &fields.data_file);
    line("%data channel", &fields.channel);
    line("number format", &"signed integer");
    line("!number of bytes per pixel", &2);
    line("number of dimensions", &3);
    line("matrix size [1]", &fields.projections);
    line("matrix size [2]", &fields.views);
    line("matrix size [3]", &fields.sinograms);
    line("data format", &"sinogram");
    line(
        "%sinogram data type",
        &match fields.mode {
            SinogramMode::NetTrues => "net trues",
            SinogramMode::PromptsAndRandoms => "prompts and randoms",
        },
    );
    line("scaling factor (mm/pixel) [1]", &geometry.bin_size_mm);
    line("scaling factor [2]", &1);
    line("scaling factor (mm/pixel) [3]", &geometry.plane_separation_mm);
    line("axial compression", &geometry.span);
    line("maximum ring difference", &geometry.max_ring_difference);
    line("number of rings", &geometry.rings);

    let segments = geometry.segment_table();
    line("number of segments", &segments.len());
    line("segment table", &braced(segments.iter()));

    line("%frame", &fields.frame_index);
    line("image relative start time (sec)", &fields.frame_start.as_secs());
    line("image duration (sec)", &fields.frame_duration.as_secs());
    line("%image duration (ms)", &fields.frame_duration.as_millis());
    if let Some(reason) = fields.end_reason {
        line("%scan end reason", &reason);
    }

    line("%total prompts", &fields.prompts);
    line("%total randoms", &fields.randoms);
    line(
        "%total net trues",
        &(fields.prompts as i64 - fields.randoms as i64),
    );
    line(
        "%average singles per block",
        &format!("{:.2}", fields.singles.average),
    );
    line("%number of blocks", &fields.singles.per_block.len());
    line(
        "%singles per block",
        &braced(fields.singles.per_block.iter().map(|r| format!("{:.0}", r))),
    );

    line(
        "%study date (dd:mm:yyyy)",
        &fields.study_time.format("%d:%m:%Y"),
    );
    line(
        "%study time (hh:mm:ss)",
        &fields.study_time.format("%H:%M:%S"),
    );
    out
}

fn braced<I, T>(items: I) -> String
where
    I: Iterator<Item = T>,
    T: ToString,
{
    let joined: Vec<String> = items.map(|i| i.to_string()).collect();
    format!("{{{}}}", joined.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeometryProvider, ScannerModel};
    use chrono::TimeZone;

    fn lines(text: &str) -> Vec<(&str, &str)> {
        text.lines()
            .filter_map(|l| l.split_once(" := "))
            .collect()
    }

    fn value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
        lines(text)
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    #[test]
    fn test_render_hrrt_header() {
        let geometry = ScannerModel::Hrrt.geometry();
        let singles = SinglesSummary {
            per_block: vec![100.0, 250.0],
            average: 175.0,
        };
        let fields = HeaderFields {
            geometry: &geometry,
            channel: Channel::Emission,
            data_file: "scan.s".into(),
            projections: 256,
            views: 288,
            sinograms: 2209,
            mode: SinogramMode::NetTrues,
            frame_index: 0,
            frame_start: Duration::ZERO,
            frame_duration: Duration::from_millis(60_500),
            prompts: 1000,
            randoms: 150,
            singles: &singles,
            study_time: Local.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap(),
            end_reason: Some(ScanEndReason::NetTruesReached),
        };
        let text = render(&fields);

        assert!(text.starts_with("!INTERFILE := \n"));
        assert_eq!(value(&text, "!name of data file"), Some("scan.s"));
        assert_eq!(value(&text, "matrix size [3]"), Some("2209"));
        assert_eq!(value(&text, "%sinogram data type"), Some("net trues"));
        assert_eq!(value(&text, "axial compression"), Some("9"));
        assert_eq!(value(&text, "number of segments"), Some("15"));
        assert_eq!(
            value(&text, "segment table"),
            Some("{207,197,197,179,179,161,161,143,143,125,125,107,107,89,89}")
        );
        assert_eq!(value(&text, "image duration (sec)"), Some("60"));
        assert_eq!(value(&text, "%image duration (ms)"), Some("60500"));
        assert_eq!(value(&text, "%total net trues"), Some("850"));
        assert_eq!(value(&text, "%average singles per block"), Some("175.00"));
        assert_eq!(value(&text, "%singles per block"), Some("{100,250}"));
        assert_eq!(value(&text, "%study date (dd:mm:yyyy)"), Some("07:03:2024"));
        assert_eq!(value(&text, "%study time (hh:mm:ss)"), Some("14:05:09"));
        assert_eq!(value(&text, "%scan end reason"), Some("net trues reached"));
    }
}
