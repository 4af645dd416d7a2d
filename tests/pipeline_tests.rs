//! Image and text jobs from source to printer frames.

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use pretty_assertions::assert_eq;

use t02relay::ir::{self, Op};
use t02relay::printer::PrinterConfig;
use t02relay::protocol::graphics::{RasterHeader, parse_raster_header};
use t02relay::render::{DitheringAlgorithm, RasterOptions, rasterize_bytes};
use t02relay::router::peer::{decode_job, encode_job};
use t02relay::text::{FontBook, TextOptions, layout_text};

fn encode_png(img: GrayImage) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[test]
fn test_landscape_image_threshold() {
    // left half black, right half white
    let img = GrayImage::from_fn(768, 384, |x, _| Luma([if x < 384 { 0 } else { 255 }]));
    let options = RasterOptions::new(DitheringAlgorithm::Threshold, 128);
    let printer = PrinterConfig::T02;

    let raster = rasterize_bytes(&encode_png(img), &options, &printer).unwrap();
    assert!(raster.rotated);
    assert_eq!(raster.bitmap.width(), 384);
    assert_eq!(raster.bitmap.height(), 768);

    // rotated clockwise: the black half ends up on top
    assert!(raster.bitmap.row(0).iter().all(|&b| b == 0xFF));
    assert!(raster.bitmap.row(383).iter().all(|&b| b == 0xFF));
    assert!(raster.bitmap.row(384).iter().all(|&b| b == 0x00));
    assert_eq!(raster.bitmap.count_marks(), 384 * 384);

    // thresholding its own output changes nothing
    let again = rasterize_bytes(&raster.bitmap.to_png().unwrap(), &options, &printer).unwrap();
    assert!(!again.rotated);
    assert_eq!(again.bitmap, raster.bitmap);
}

#[test]
fn test_hello_world_single_line() {
    let printer = PrinterConfig::T02;
    let layout = layout_text(
        &TextOptions::document("Hello world", 40.0),
        &FontBook::builtin(),
        &printer,
    )
    .unwrap();

    assert_eq!(layout.lines, vec!["Hello world".to_string()]);
    // one 48px line plus 20px padding above and below
    assert_eq!(layout.bitmap.height(), 88);
    assert_eq!(layout.bitmap.width(), 384);
    assert!(layout.bitmap.count_marks() > 0);
}

#[test]
fn test_tall_job_is_sliced() {
    let img = GrayImage::from_pixel(384, 300, Luma([0]));
    let printer = PrinterConfig::T02;
    let raster = rasterize_bytes(
        &encode_png(img),
        &RasterOptions::new(DitheringAlgorithm::FloydSteinberg, 128),
        &printer,
    )
    .unwrap();
    let program = ir::encode(&raster.bitmap, None, &printer).unwrap();

    let heights: Vec<u16> = program
        .ops
        .iter()
        .filter_map(|op| match op {
            Op::Raster { height, .. } => Some(*height),
            _ => None,
        })
        .collect();
    assert_eq!(heights, vec![128, 128, 44]);
    assert_eq!(program.ops.first(), Some(&Op::Init));
    assert_eq!(program.ops.last(), Some(&Op::Feed { lines: 1 }));

    let frames = program.to_frames();
    assert_eq!(frames.len(), 5);
    assert_eq!(
        parse_raster_header(&frames[1]),
        Some(RasterHeader {
            width_bytes: 48,
            height: 128
        })
    );
    assert_eq!(parse_raster_header(&frames[3]).map(|h| h.height), Some(44));
    assert_eq!(frames.concat(), program.to_bytes());
}

#[test]
fn test_frames_survive_peer_payload() {
    let printer = PrinterConfig::T02;
    let layout = layout_text(
        &TextOptions::banner("SALE", 200.0),
        &FontBook::builtin(),
        &printer,
    )
    .unwrap();
    let frames = ir::encode(&layout.bitmap, None, &printer)
        .unwrap()
        .to_frames();

    let payload = encode_job(&frames).unwrap();
    assert_eq!(decode_job(&payload).unwrap(), frames);
}
