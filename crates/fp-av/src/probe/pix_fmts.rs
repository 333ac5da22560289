//! Parser for `ffmpeg -pix_fmts` listings.
//!
//! The listing is a legend, a header, a `-----` separator and then one row
//! per format:
//!
//! ```text
//! FLAGS NAME            NB_COMPONENTS BITS_PER_PIXEL BIT_DEPTHS
//! -----
//! IO... yuv420p                3             12      8-8-8
//! IO... rgb24                  3             24      8-8-8
//! ```

use std::sync::LazyLock;

use fp_core::{FormatTable, PixelFormat};
use regex::Regex;

static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[IOHPB.]{5}\s+([a-zA-Z0-9_]+)").expect("static regex"));

/// Parse the full stdout of `ffmpeg -hide_banner -pix_fmts`.
///
/// Rows that do not start with a flag column are skipped. A bits-per-pixel
/// column that is not a number leaves the format in the table with unknown
/// bits-per-pixel.
///
/// # Errors
///
/// Returns [`fp_core::Error::ToolInvocation`] when the separator row is
/// missing, i.e. the output is not a pixel format listing at all.
pub fn parse_pix_fmts(output: &str) -> fp_core::Result<FormatTable> {
    let mut lines = output.lines();
    if !lines.any(|line| line.trim().starts_with("-----")) {
        return Err(fp_core::Error::tool(
            "ffmpeg",
            "unexpected -pix_fmts output format (no separator row)",
        ));
    }

    Ok(lines.filter_map(parse_row).collect())
}

fn parse_row(line: &str) -> Option<PixelFormat> {
    let name = ROW.captures(line)?.get(1)?.as_str();
    let bits_per_pixel = line
        .split_whitespace()
        .nth(3)
        .and_then(|col| col.parse::<u32>().ok());
    Some(PixelFormat::new(name, bits_per_pixel))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Pixel formats:
I.... = Supported Input  format for conversion
.O... = Supported Output format for conversion
..H.. = Hardware accelerated format
...P. = Paletted format
....B = Bitstream format
FLAG NAME            NB_COMPONENTS BITS_PER_PIXEL BIT_DEPTHS
-----
IO... yuv420p                3             12      8-8-8
IO... rgb24                  3             24      8-8-8
IO... gray                   1              8      8
..H.. vaapi                  0              0      0
IO..B monob                  1              1      1
";

    #[test]
    fn parses_rows_after_separator() {
        let table = parse_pix_fmts(LISTING).unwrap();
        assert_eq!(
            table.names().collect::<Vec<_>>(),
            ["yuv420p", "rgb24", "gray", "vaapi", "monob"]
        );
        assert_eq!(table.get("yuv420p").unwrap().bits_per_pixel, Some(12));
        assert_eq!(table.get("rgb24").unwrap().bits_per_pixel, Some(24));
        assert_eq!(table.get("monob").unwrap().bits_per_pixel, Some(1));
    }

    #[test]
    fn legend_lines_are_not_formats() {
        // The legend rows also start with flag-like columns but sit above the
        // separator.
        let table = parse_pix_fmts(LISTING).unwrap();
        assert!(!table.contains("="));
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn missing_separator_is_tool_error() {
        let err = parse_pix_fmts("ffmpeg version 6.0\nusage: ffmpeg ...").unwrap_err();
        assert!(matches!(err, fp_core::Error::ToolInvocation { .. }));
    }

    #[test]
    fn unparseable_bits_per_pixel_is_kept_as_unknown() {
        let table = parse_pix_fmts("-----\nIO... odd   3   ?   8-8-8\n").unwrap();
        assert!(table.contains("odd"));
        assert_eq!(table.get("odd").unwrap().bits_per_pixel, None);
    }

    #[test]
    fn garbage_rows_are_skipped() {
        let table = parse_pix_fmts("-----\n\nnot a row\nIO... rgba 4 32 8-8-8-8\n").unwrap();
        assert_eq!(table.names().collect::<Vec<_>>(), ["rgba"]);
    }
}
